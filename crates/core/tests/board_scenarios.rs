// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use pinsim_core::components::Lcd;
use pinsim_core::{
    BoardProfile, ComponentState, CycleReport, EngineConfig, PinFunction, PinState,
    RegisterChange, RegisterObserver, SimWarning, SimulationEngine, SimulationError,
    SimulationObserver,
};
use std::sync::{Arc, Mutex};

fn f446re() -> SimulationEngine {
    SimulationEngine::from_builtin("F446RE").unwrap()
}

fn lcd_text(engine: &SimulationEngine, id: &str) -> Vec<String> {
    match &engine.component(id).unwrap().state {
        ComponentState::Lcd(Lcd { lines, .. }) => lines.clone(),
        other => panic!("{} is not an LCD: {:?}", id, other),
    }
}

fn print_via_register(engine: &mut SimulationEngine, register: &str, text: &str) {
    for b in text.bytes() {
        engine.write_register(register, 0x40).unwrap();
        engine.write_register(register, b as u32).unwrap();
    }
}

#[test]
fn test_bsrr_write_lights_led() {
    let mut engine = f446re();
    let report = engine.write_register("GPIOA_BSRR", 1 << 5).unwrap();

    assert_eq!(report.pin("PA5").unwrap().state, PinState::Digital(true));
    match &report.component("led1").unwrap().state {
        ComponentState::Led(led) => assert!(led.lit),
        other => panic!("unexpected state {:?}", other),
    }
    assert_eq!(engine.read_register("GPIOA_ODR").unwrap(), 1 << 5);
    assert_eq!(engine.read_register("GPIOA_BSRR").unwrap(), 0);

    let report = engine.write_register("GPIOA_BSRR", 1 << (5 + 16)).unwrap();
    assert_eq!(report.pin("PA5").unwrap().state, PinState::Digital(false));
    assert_eq!(engine.read_register("GPIOA_ODR").unwrap(), 0);
    assert_eq!(engine.read_register("GPIOA_BSRR").unwrap(), 0);
}

#[test]
fn test_register_readback_is_masked() {
    let mut engine = f446re();
    engine.write_register("GPIOB_ODR", 0xFFFF_FFFF).unwrap();
    assert_eq!(engine.read_register("GPIOB_ODR").unwrap(), 0xFFFF);
    engine.write_register("I2C1_CR1", 0x1).unwrap();
    assert_eq!(engine.read_register("I2C1_CR1").unwrap(), 0x1);
}

#[test]
fn test_potentiometer_reaches_adc() {
    let mut engine = f446re();
    let report = engine.set_potentiometer("pot1", 75).unwrap();
    assert_eq!(report.pin("PA0").unwrap().state, PinState::Analog(0.75));
    let expected = (0.75f64 * 4095.0).round() as u32;
    assert_eq!(engine.read_register("ADC1_DR").unwrap(), expected);
    assert_eq!(report.register("ADC1_DR").unwrap().new, expected);
}

#[test]
fn test_potentiometer_on_small_board() {
    let mut engine = SimulationEngine::from_builtin("f031k6").unwrap();
    // Initial wiper position is mirrored at power-on.
    assert_eq!(engine.read_register("ADC_DR").unwrap(), 2048);
    engine.set_potentiometer("pot1", 100).unwrap();
    assert_eq!(engine.read_register("ADC_DR").unwrap(), 4095);
    // Out of range values clamp.
    engine.set_potentiometer("pot1", 200).unwrap();
    assert_eq!(engine.read_register("ADC_DR").unwrap(), 4095);
}

#[test]
fn test_sensor_maps_reading_to_adc() {
    let mut engine = f446re();
    engine.set_sensor("light1", 250.0).unwrap();
    assert_eq!(engine.pin("PA1").unwrap().state, PinState::Analog(0.25));
    assert_eq!(engine.read_register("ADC1_JDR1").unwrap(), 1024);
}

#[test]
fn test_connected_outputs_warn_and_latest_write_wins() {
    let mut engine = f446re();
    engine.write_register("GPIOA_BSRR", 1 << 6).unwrap();

    let report = engine.connect("PA6", "PA7").unwrap();
    assert_eq!(
        report.warnings,
        vec![SimWarning::ConflictingDrivers {
            pins: ["PA6".to_string(), "PA7".to_string()]
        }]
    );
    assert!(engine.pin("PA6").unwrap().state.is_high());
    assert!(engine.pin("PA7").unwrap().state.is_high());

    // Re-asserting PA7 low makes it the most recent writer.
    let report = engine.write_register("GPIOA_BSRR", 1 << (7 + 16)).unwrap();
    assert!(!report.warnings.is_empty());
    assert!(!engine.pin("PA6").unwrap().state.is_high());
    assert!(!engine.pin("PA7").unwrap().state.is_high());
}

#[test]
fn test_disconnect_returns_outputs_to_their_odr_bits() {
    let mut engine = f446re();
    engine.connect("PA6", "PA9").unwrap();
    engine.write_register("GPIOA_BSRR", 1 << 6).unwrap();
    engine.write_register("GPIOA_BSRR", 1 << (7 + 16)).unwrap();

    // PA7 was written last, so it pulls PA6 and the input on its net low.
    engine.connect("PA6", "PA7").unwrap();
    assert!(!engine.pin("PA6").unwrap().state.is_high());
    assert!(!engine.pin("PA9").unwrap().state.is_high());

    let report = engine.disconnect("PA6", "PA7").unwrap();
    assert_eq!(report.pin("PA6").unwrap().state, PinState::Digital(true));
    assert!(report.pin("PA7").is_none());
    assert!(engine.pin("PA9").unwrap().state.is_high());
    assert_eq!(engine.read_register("GPIOA_IDR").unwrap() & (1 << 9), 1 << 9);
    assert!(!engine.pin("PA7").unwrap().state.is_high());

    // Unwired pins report no change.
    assert!(engine.disconnect("PA6", "PA7").unwrap().is_empty());
}

#[test]
fn test_output_drives_connected_input() {
    let mut engine = f446re();
    let report = engine.connect("PA6", "PA9").unwrap();
    assert!(report.warnings.is_empty());

    engine.write_register("GPIOA_BSRR", 1 << 6).unwrap();
    assert!(engine.pin("PA9").unwrap().state.is_high());
    assert_eq!(engine.read_register("GPIOA_IDR").unwrap() & (1 << 9), 1 << 9);

    // Disconnecting keeps the last state.
    engine.disconnect("PA6", "PA9").unwrap();
    engine.write_register("GPIOA_BSRR", 1 << (6 + 16)).unwrap();
    assert!(engine.pin("PA9").unwrap().state.is_high());
}

#[test]
fn test_connected_inputs_are_a_noop() {
    let mut engine = f446re();
    engine.drive_digital("PA9", true).unwrap();
    let report = engine.connect("PA9", "PA10").unwrap();
    assert!(report.pins.is_empty());
    assert!(engine.pin("PA9").unwrap().state.is_high());
}

#[test]
fn test_power_rail_pulls_input_high() {
    let mut engine = f446re();
    engine.connect("3V3", "PA9").unwrap();
    assert!(engine.pin("PA9").unwrap().state.is_high());
    assert!(engine.pin("3V3").unwrap().state.is_high());
}

#[test]
fn test_connect_is_idempotent() {
    let mut engine = f446re();
    engine.connect("PA6", "PA9").unwrap();
    let once = engine.neighbors("PA6").unwrap();
    let report = engine.connect("PA6", "PA9").unwrap();
    assert!(report.is_empty());
    assert_eq!(engine.neighbors("PA6").unwrap(), once);
    assert_eq!(once, vec!["PA9".to_string()]);
}

#[test]
fn test_connect_validation() {
    let mut engine = f446re();
    assert_eq!(
        engine.connect("PZ1", "PZ1"),
        Err(SimulationError::UnknownPin("PZ1".to_string()))
    );
    assert_eq!(
        engine.connect("PA6", "PA6"),
        Err(SimulationError::SelfConnection("PA6".to_string()))
    );
    assert_eq!(
        engine.connect("PA6", "PZ9"),
        Err(SimulationError::UnknownPin("PZ9".to_string()))
    );
    assert!(engine.neighbors("PA6").unwrap().is_empty());
}

#[test]
fn test_input_round_trip_keeps_last_level() {
    let mut engine = f446re();
    engine.drive_digital("PA9", true).unwrap();
    engine.drive_digital("PA9", false).unwrap();
    assert_eq!(engine.read_register("GPIOA_IDR").unwrap() & (1 << 9), 0);
}

#[test]
fn test_button_press_reaches_idr() {
    let mut engine = f446re();
    assert_eq!(engine.read_register("GPIOC_IDR").unwrap() & (1 << 13), 1 << 13);

    let report = engine.press("button1").unwrap();
    assert_eq!(report.pin("PC13").unwrap().state, PinState::Digital(false));
    assert_eq!(engine.read_register("GPIOC_IDR").unwrap() & (1 << 13), 0);

    engine.release("button1").unwrap();
    assert_eq!(engine.read_register("GPIOC_IDR").unwrap() & (1 << 13), 1 << 13);
}

#[test]
fn test_switch_toggle_persists() {
    let mut engine = f446re();
    engine.toggle("switch1").unwrap();
    assert!(!engine.pin("PA10").unwrap().state.is_high());
    engine.toggle("switch1").unwrap();
    assert!(engine.pin("PA10").unwrap().state.is_high());
}

#[test]
fn test_pwm_feeds_buzzer() {
    let mut engine = f446re();
    engine.write_register("TIM1_ARR", 1000).unwrap();
    let report = engine.write_register("TIM1_CCR1", 500).unwrap();
    assert_eq!(report.pin("PA8").unwrap().state, PinState::Analog(0.5));
    match &engine.component("buzzer1").unwrap().state {
        ComponentState::Buzzer(b) => {
            assert!(b.active);
            assert_eq!(b.duty, 0.5);
        }
        other => panic!("unexpected state {:?}", other),
    }

    engine.write_register("TIM1_ARR", 0).unwrap();
    assert_eq!(engine.pin("PA8").unwrap().state, PinState::Analog(0.0));
}

#[test]
fn test_read_only_registers() {
    let mut engine = f446re();
    for name in ["GPIOA_IDR", "ADC1_DR"] {
        assert_eq!(
            engine.write_register(name, 1),
            Err(SimulationError::ReadOnlyViolation(name.to_string()))
        );
    }
    assert_eq!(
        engine.write_register("GPIOZ_ODR", 1),
        Err(SimulationError::UnknownRegister("GPIOZ_ODR".to_string()))
    );
}

#[test]
fn test_output_pin_cannot_be_driven() {
    let mut engine = f446re();
    assert_eq!(
        engine.drive_digital("PA5", true),
        Err(SimulationError::PinDirectionConflict {
            pin: "PA5".to_string(),
            function: PinFunction::GpioOutput
        })
    );
    assert_eq!(
        engine.drive_analog("PA9", 0.5),
        Err(SimulationError::PinKindMismatch("PA9".to_string()))
    );
}

#[test]
fn test_moder_turns_input_into_output() {
    let mut engine = f446re();
    let moder = engine.read_register("GPIOA_MODER").unwrap();
    engine
        .write_register("GPIOA_MODER", (moder & !(0b11 << 18)) | (0b01 << 18))
        .unwrap();
    assert_eq!(engine.pin("PA9").unwrap().function, PinFunction::GpioOutput);

    let report = engine.write_register("GPIOA_BSRR", 1 << 9).unwrap();
    assert_eq!(report.pin("PA9").unwrap().state, PinState::Digital(true));
}

#[test]
fn test_keypad_press_settles_in_two_generations() {
    let mut engine = f446re();
    // Rows idle high.
    assert_eq!(engine.read_register("GPIOB_IDR").unwrap() & 0xF, 0xF);

    let report = engine.press_key("keypad1", 1, 2).unwrap();
    assert_eq!(report.generations, 2);
    assert_eq!(report.pin("PB1").unwrap().state, PinState::Digital(false));
    assert_eq!(engine.read_register("GPIOB_IDR").unwrap() & 0xF, 0b1101);

    engine.release_key("keypad1").unwrap();
    assert_eq!(engine.read_register("GPIOB_IDR").unwrap() & 0xF, 0xF);
}

#[test]
fn test_keypad_follows_column_scan() {
    let mut engine = f446re();
    // Only column 2 asserted (active low).
    engine
        .write_register("GPIOB_ODR", (1 << 12) | (1 << 13))
        .unwrap();
    engine.press_key("keypad1", 0, 0).unwrap();
    assert!(engine.pin("PB0").unwrap().state.is_high());

    // Scan moves to column 0.
    let report = engine
        .write_register("GPIOB_ODR", (1 << 13) | (1 << 14))
        .unwrap();
    assert_eq!(report.generations, 2);
    assert!(!engine.pin("PB0").unwrap().state.is_high());
}

#[test]
fn test_keypad_diverges_under_single_generation() {
    let profile = BoardProfile::builtin("F446RE").unwrap();
    let mut engine = SimulationEngine::new(profile, EngineConfig { generation_limit: 1 }).unwrap();

    assert_eq!(
        engine.press_key("keypad1", 1, 2),
        Err(SimulationError::PropagationDivergence {
            pins: vec!["PB1".to_string()],
            generations: 1
        })
    );
    // Rolled back to the settled state before the press.
    assert!(engine.pin("PB1").unwrap().state.is_high());
    match &engine.component("keypad1").unwrap().state {
        ComponentState::Keypad(pad) => assert_eq!(pad.pressed, None),
        other => panic!("unexpected state {:?}", other),
    }
}

#[test]
fn test_keypad_rejects_unknown_key() {
    let mut engine = f446re();
    assert_eq!(
        engine.press_key("keypad1", 0, 3),
        Err(SimulationError::InvalidKey {
            component: "keypad1".to_string(),
            row: 0,
            col: 3
        })
    );
}

#[test]
fn test_lcd_prints_through_i2c_data_register() {
    let mut engine = f446re();
    engine.write_register("I2C1_CR1", 1).unwrap();
    print_via_register(&mut engine, "I2C1_DR", "Hi");
    assert_eq!(&lcd_text(&engine, "lcd1")[0][..2], "Hi");

    // Second row.
    engine.write_register("I2C1_DR", 0x00).unwrap();
    engine.write_register("I2C1_DR", 0xC0).unwrap();
    print_via_register(&mut engine, "I2C1_DR", "ok");
    assert_eq!(&lcd_text(&engine, "lcd1")[1][..2], "ok");
}

#[test]
fn test_lcd_ignores_bus_without_i2c_function() {
    let mut engine = f446re();
    engine.assign_function("PB9", PinFunction::GpioOutput).unwrap();
    engine.bus_write("i2c1", &[0x40, b'X']).unwrap();
    assert_eq!(lcd_text(&engine, "lcd1")[0].trim(), "");

    engine.assign_function("PB9", PinFunction::I2cSda).unwrap();
    let report = engine.bus_write("i2c1", &[0x40, b'X']).unwrap();
    assert!(report.component("lcd1").is_some());
    assert!(lcd_text(&engine, "lcd1")[0].starts_with('X'));
}

#[test]
fn test_segment_digits_multiplex() {
    let mut engine = f446re();
    // '7' on digit 0, others deselected (high).
    engine
        .write_register("GPIOC_ODR", 0x07 | (0b1110 << 8))
        .unwrap();
    // '1' on digit 1.
    engine
        .write_register("GPIOC_ODR", 0x06 | (0b1101 << 8))
        .unwrap();

    match &engine.component("display1").unwrap().state {
        ComponentState::Segment(display) => {
            assert_eq!(display.text(), "71  ");
            assert_eq!(display.digits[0].pattern, 0x07);
        }
        other => panic!("unexpected state {:?}", other),
    }
}

#[test]
fn test_unsupported_interactions() {
    let mut engine = f446re();
    assert!(matches!(
        engine.toggle("button1"),
        Err(SimulationError::UnsupportedInteraction { interaction: "toggle", .. })
    ));
    assert_eq!(
        engine.press("nope"),
        Err(SimulationError::UnknownComponent("nope".to_string()))
    );
}

#[derive(Debug, Default)]
struct Recorder {
    cycles: Mutex<Vec<CycleReport>>,
    warnings: Mutex<Vec<SimWarning>>,
    divergences: Mutex<Vec<Vec<String>>>,
    changes: Mutex<Vec<RegisterChange>>,
}

impl SimulationObserver for Recorder {
    fn on_cycle_settled(&self, report: &CycleReport) {
        self.cycles.lock().unwrap().push(report.clone());
    }

    fn on_warning(&self, warning: &SimWarning) {
        self.warnings.lock().unwrap().push(warning.clone());
    }

    fn on_divergence(&self, pins: &[String]) {
        self.divergences.lock().unwrap().push(pins.to_vec());
    }
}

impl RegisterObserver for Recorder {
    fn on_register_change(&self, change: &RegisterChange) {
        self.changes.lock().unwrap().push(change.clone());
    }
}

#[test]
fn test_observers_see_cycles_and_register_changes() {
    let mut engine = f446re();
    let recorder = Arc::new(Recorder::default());
    engine.add_observer(recorder.clone());
    engine.add_register_observer(recorder.clone());

    engine.write_register("RCC_AHB1ENR", 1).unwrap();
    engine.write_register("GPIOA_BSRR", 1 << 5).unwrap();
    engine.write_register("GPIOA_BSRR", 1 << 6).unwrap();
    engine.connect("PA5", "PA6").unwrap();

    assert_eq!(recorder.cycles.lock().unwrap().len(), 4);
    assert_eq!(recorder.warnings.lock().unwrap().len(), 1);
    let changes = recorder.changes.lock().unwrap();
    assert!(changes.iter().all(|c| c.name == "GPIOA_ODR"));
    assert_eq!(changes.len(), 2);
}

#[test]
fn test_observers_see_divergence() {
    let profile = BoardProfile::builtin("F446RE").unwrap();
    let mut engine = SimulationEngine::new(profile, EngineConfig { generation_limit: 1 }).unwrap();
    let recorder = Arc::new(Recorder::default());
    engine.add_observer(recorder.clone());

    assert!(engine.press_key("keypad1", 0, 0).is_err());
    assert_eq!(
        *recorder.divergences.lock().unwrap(),
        vec![vec!["PB0".to_string()]]
    );
    assert!(recorder.cycles.lock().unwrap().is_empty());
}

#[test]
fn test_register_observers_skip_rolled_back_writes() {
    let profile = BoardProfile::builtin("F446RE").unwrap();
    let mut engine = SimulationEngine::new(profile, EngineConfig { generation_limit: 1 }).unwrap();
    let recorder = Arc::new(Recorder::default());
    engine.add_register_observer(recorder.clone());

    // All columns idle, so pressing a key changes no row.
    let idle = (1 << 12) | (1 << 13) | (1 << 14);
    engine.write_register("GPIOB_ODR", idle).unwrap();
    engine.press_key("keypad1", 0, 0).unwrap();
    let seen = recorder.changes.lock().unwrap().len();
    assert_eq!(seen, 1);

    // Asserting column 0 needs a second generation for row 0.
    assert!(matches!(
        engine.write_register("GPIOB_ODR", idle & !(1 << 12)),
        Err(SimulationError::PropagationDivergence { .. })
    ));
    assert_eq!(engine.read_register("GPIOB_ODR").unwrap(), idle);
    assert_eq!(recorder.changes.lock().unwrap().len(), seen);
}

#[test]
fn test_profile_with_out_of_range_gpio_line_is_rejected() {
    let mut profile = BoardProfile::builtin("F446RE").unwrap();
    let pin = profile.pins.iter_mut().find(|p| p.id == "PA5").unwrap();
    pin.gpio.as_mut().unwrap().line = 20;

    assert!(matches!(
        SimulationEngine::new(profile, EngineConfig::default()),
        Err(SimulationError::Profile(_))
    ));
}

#[test]
fn test_load_profile_resets_board() {
    let mut engine = f446re();
    engine.write_register("GPIOA_BSRR", 1 << 5).unwrap();

    engine
        .load_profile(BoardProfile::builtin("L476RG").unwrap())
        .unwrap();
    assert_eq!(engine.profile().id, "L476RG");
    assert_eq!(engine.read_register("GPIOA_ODR").unwrap(), 0);

    engine.write_register("GPIOA_ODR", 1 << 5).unwrap();
    engine.write_register("GPIOA_BRR", 1 << 5).unwrap();
    assert!(!engine.pin("PA5").unwrap().state.is_high());
    match &engine.component("keypad1").unwrap().state {
        ComponentState::Keypad(pad) => assert_eq!(pad.cols, 4),
        other => panic!("unexpected state {:?}", other),
    }
}

#[test]
fn test_apply_dispatches_stimuli() {
    let mut engine = f446re();
    let steps: Vec<pinsim_core::Stimulus> = serde_yaml::from_str(
        r#"
- action: set_bits
  name: GPIOA_ODR
  mask: 32
- action: set_potentiometer
  component: pot1
  percent: 50
- action: press
  component: button1
"#,
    )
    .unwrap();
    for step in &steps {
        engine.apply(step).unwrap();
    }
    assert!(engine.pin("PA5").unwrap().state.is_high());
    assert_eq!(engine.pin("PA0").unwrap().state, PinState::Analog(0.5));
    assert!(!engine.pin("PC13").unwrap().state.is_high());
}
