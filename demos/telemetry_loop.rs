use std::{sync::Arc, thread, time::Duration};

use lewansoul_bus::{
    start_control_loop, BusConfig, ControlLoopConfig, ServoBus, ServoCommand, ServoId, SimulatedBus,
};

fn main() -> anyhow::Result<()> {
    let ids = vec![ServoId(1), ServoId(2)];
    let sim = SimulatedBus::new(&ids);
    let bus = Arc::new(ServoBus::new(sim, BusConfig::default())?);

    let handle = start_control_loop(Arc::clone(&bus), ids.clone(), ControlLoopConfig::default())?;
    handle.push(ServoCommand::SetPowered { ids: ids.clone(), powered: true })?;
    handle.push(ServoCommand::Move { id: ServoId(1), degrees: 30.0, seconds: 0.5 })?;
    handle.push(ServoCommand::Move { id: ServoId(2), degrees: 210.0, seconds: 0.5 })?;
    thread::sleep(Duration::from_millis(300));

    let snap = handle.last_snapshot()?;
    for servo in &snap.servos {
        println!(
            "{} at {:.3}: {:.1} deg, {:.0} C, {:.2} V",
            bus.servo(servo.id),
            snap.timestamp_s,
            servo.position_deg,
            servo.temperature_c,
            servo.voltage_v
        );
    }
    handle.close();
    Ok(())
}
