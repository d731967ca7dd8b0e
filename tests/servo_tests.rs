use std::time::Duration;

use lewansoul_bus::{
    BusConfig, BusError, Command, LedErrorTriggers, ServoBus, ServoId, ServoMode, SimulatedBus,
    TemperatureUnit,
};

fn setup(ids: &[ServoId]) -> (SimulatedBus, ServoBus<SimulatedBus>) {
    let sim = SimulatedBus::new(ids);
    let cfg = BusConfig { timeout: Duration::from_millis(20), ..BusConfig::default() };
    let bus = ServoBus::new(sim.clone(), cfg).unwrap();
    (sim, bus)
}

#[test]
fn display_uses_name_when_given() {
    let (_sim, bus) = setup(&[ServoId(3)]);
    assert_eq!(bus.named_servo(ServoId(3), "elbow").to_string(), "elbow (ID 3)");
    assert_eq!(bus.servo(ServoId(3)).to_string(), "Servo (ID 3)");
}

#[test]
fn handle_follows_servo_through_id_change() {
    let (sim, bus) = setup(&[ServoId(1)]);
    let mut servo = bus.servo(ServoId(1));

    servo.id_write(ServoId(9)).unwrap();

    assert_eq!(servo.id(), ServoId(9));
    assert!(sim.servo(ServoId(1)).is_none());
    assert_eq!(servo.id_read().unwrap(), ServoId(9));
    assert_eq!(servo.pos_read().unwrap(), 120.0);
}

#[test]
fn id_write_to_same_id_sends_nothing() {
    let (sim, bus) = setup(&[ServoId(1)]);
    bus.id_write(ServoId(1), ServoId(1)).unwrap();
    assert!(sim.received().is_empty());

    assert!(matches!(
        bus.id_write(ServoId(1), ServoId::BROADCAST),
        Err(BusError::ParameterOutOfRange { field: "servo id", .. })
    ));
}

#[test]
fn queued_move_starts_on_command() {
    let (sim, bus) = setup(&[ServoId(2)]);
    let servo = bus.servo(ServoId(2));

    servo.move_time_wait_write(60.0, 1.5).unwrap();
    assert_eq!(servo.move_time_wait_read().unwrap(), (60.0, 1.5));
    assert_eq!(servo.pos_read().unwrap(), 120.0);

    servo.move_start().unwrap();
    assert_eq!(servo.pos_read().unwrap(), 60.0);
    assert_eq!(servo.move_time_read().unwrap(), (60.0, 1.5));
    assert!(sim.servo(ServoId(2)).unwrap().powered);
}

#[test]
fn speed_move_derives_duration_from_distance() {
    let (sim, bus) = setup(&[ServoId(1)]);
    let servo = bus.servo(ServoId(1));

    servo.move_speed_write(60.0, 120.0, false).unwrap();
    assert_eq!(sim.servo(ServoId(1)).unwrap().move_target, (250, 500));

    assert!(matches!(
        servo.move_speed_write(60.0, 0.0, false),
        Err(BusError::InvalidArgument(_))
    ));
}

#[test]
fn velocity_of_a_resting_servo_is_zero() {
    let (_sim, bus) = setup(&[ServoId(1)]);
    let v = bus.servo(ServoId(1)).velocity_read(Duration::from_millis(10)).unwrap();
    assert_eq!(v, 0.0);
}

#[test]
fn angle_offset_can_be_persisted() {
    let (sim, bus) = setup(&[ServoId(1)]);
    let servo = bus.servo(ServoId(1));

    servo.angle_offset_adjust(-6.0, true).unwrap();

    assert_eq!(servo.angle_offset_read().unwrap(), -6.0);
    assert_eq!(sim.servo(ServoId(1)).unwrap().angle_offset, -25);
    assert!(sim.received().iter().any(|p| p.command == Command::AngleOffsetWrite));
    assert!(matches!(
        servo.angle_offset_adjust(31.0, false),
        Err(BusError::ValueOutOfRange { .. })
    ));
}

#[test]
fn angle_limits_are_clamped_but_must_be_ordered() {
    let (_sim, bus) = setup(&[ServoId(1)]);
    let servo = bus.servo(ServoId(1));

    servo.angle_limit_write(-10.0, 300.0).unwrap();
    assert_eq!(servo.angle_limit_read().unwrap(), (0.0, 240.0));

    servo.angle_limit_write(24.0, 216.0).unwrap();
    assert_eq!(servo.angle_limit_read().unwrap(), (24.0, 216.0));

    assert!(matches!(servo.angle_limit_write(90.0, 90.0), Err(BusError::InvalidArgument(_))));
}

#[test]
fn voltage_limits_round_trip() {
    let (_sim, bus) = setup(&[ServoId(1)]);
    let servo = bus.servo(ServoId(1));

    servo.vin_limit_write(6.5, 8.4).unwrap();
    assert_eq!(servo.vin_limit_read().unwrap(), (6.5, 8.4));
    assert_eq!(servo.vin_read().unwrap(), 7.4);

    assert!(matches!(servo.vin_limit_write(8.0, 6.0), Err(BusError::InvalidArgument(_))));
    assert!(matches!(servo.vin_limit_write(4.0, 6.0), Err(BusError::ValueOutOfRange { .. })));
}

#[test]
fn temperatures_convert_between_units() {
    let (sim, bus) = setup(&[ServoId(1)]);
    let servo = bus.servo(ServoId(1));

    assert_eq!(servo.temp_read(TemperatureUnit::Celsius).unwrap(), 30.0);
    assert_eq!(servo.temp_read(TemperatureUnit::Fahrenheit).unwrap(), 86.0);

    servo.temp_max_limit_write(185.0, TemperatureUnit::Fahrenheit).unwrap();
    assert_eq!(sim.servo(ServoId(1)).unwrap().temp_limit, 85);
    assert_eq!(servo.temp_max_limit_read(TemperatureUnit::Celsius).unwrap(), 85.0);

    assert!(matches!(
        servo.temp_max_limit_write(40.0, TemperatureUnit::Celsius),
        Err(BusError::ValueOutOfRange { .. })
    ));
}

#[test]
fn motor_mode_round_trip() {
    let (_sim, bus) = setup(&[ServoId(1)]);
    let servo = bus.servo(ServoId(1));

    assert_eq!(servo.mode_read().unwrap(), ServoMode::Servo);
    servo.mode_write(ServoMode::Motor { speed: -300 }).unwrap();
    assert_eq!(servo.mode_read().unwrap(), ServoMode::Motor { speed: -300 });
    servo.mode_write(ServoMode::Servo).unwrap();
    assert_eq!(servo.mode_read().unwrap(), ServoMode::Servo);
}

#[test]
fn power_and_leds() {
    let (sim, bus) = setup(&[ServoId(1)]);
    let servo = bus.servo(ServoId(1));

    assert!(!servo.is_powered().unwrap());
    servo.set_powered(true).unwrap();
    assert!(servo.is_powered().unwrap());

    assert!(servo.led_ctrl_read().unwrap());
    servo.led_ctrl_write(false).unwrap();
    assert!(sim.servo(ServoId(1)).unwrap().led_off);
    assert!(!servo.led_ctrl_read().unwrap());

    let triggers = LedErrorTriggers { stalled: true, over_voltage: false, over_temperature: true };
    servo.led_error_write(triggers).unwrap();
    assert_eq!(servo.led_error_read().unwrap(), triggers);
}

#[test]
fn snapshot_reads_every_sensor() {
    let (sim, bus) = setup(&[ServoId(5)]);
    sim.update(ServoId(5), |s| {
        s.position = 125;
        s.temperature = 41;
        s.vin_mv = 11_100;
    });

    let snap = bus.servo(ServoId(5)).read_snapshot().unwrap();
    assert_eq!(snap.id, ServoId(5));
    assert_eq!(snap.position_deg, 30.0);
    assert_eq!(snap.velocity_dps, None);
    assert_eq!(snap.angle_offset_deg, 0.0);
    assert_eq!(snap.temperature_c, 41.0);
    assert_eq!(snap.voltage_v, 11.1);
}

#[test]
fn missing_servo_times_out() {
    let (_sim, bus) = setup(&[ServoId(1)]);
    assert_eq!(
        bus.servo(ServoId(8)).pos_read(),
        Err(BusError::Timeout { id: 8, command: Command::PosRead })
    );
}
