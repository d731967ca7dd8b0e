use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use tokio::{
    runtime::Builder,
    sync::{mpsc, watch},
    time,
};
use tracing::{debug, warn};

use crate::{
    bus::ServoBus,
    error::BusError,
    model::{ServoId, ServoSnapshot},
    transport::ByteChannel,
};

#[derive(Debug, Clone, Copy)]
pub struct ControlLoopConfig {
    pub poll_period: Duration,
    pub channel_capacity: usize,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self { poll_period: Duration::from_millis(100), channel_capacity: 64 }
    }
}

#[derive(Debug, Clone)]
pub struct BusSnapshot {
    pub servos: Vec<ServoSnapshot>,
    pub timestamp_s: f64,
}

#[derive(Debug, Clone)]
pub enum ServoCommand {
    Move { id: ServoId, degrees: f64, seconds: f64 },
    Stop { id: ServoId },
    SetPowered { ids: Vec<ServoId>, powered: bool },
}

#[derive(Debug)]
pub struct ControlLoopHandle {
    tx: mpsc::Sender<ServoCommand>,
    last_snapshot: Arc<Mutex<Result<BusSnapshot, BusError>>>,
    stop: watch::Sender<bool>,
}

impl ControlLoopHandle {
    pub fn push(&self, cmd: ServoCommand) -> Result<(), BusError> {
        self.tx.blocking_send(cmd).map_err(|_| BusError::Closed)
    }

    pub fn last_snapshot(&self) -> Result<BusSnapshot, BusError> {
        self.last_snapshot.lock().map_err(|_| BusError::Closed)?.clone()
    }

    /// Stop the worker after its current step. The worker releases its
    /// reference to the bus as it exits.
    pub fn close(&self) {
        // Fails only if the worker is already gone.
        let _ = self.stop.send(true);
    }
}

/// Poll `ids` every `cfg.poll_period` on a worker thread, running queued
/// commands in between. Fails with [`BusError::MissingServos`] if any id
/// does not answer an id read.
pub fn start_control_loop<C: ByteChannel>(
    bus: Arc<ServoBus<C>>,
    ids: Vec<ServoId>,
    cfg: ControlLoopConfig,
) -> Result<ControlLoopHandle, BusError> {
    let missing: Vec<u8> = ids
        .iter()
        .filter(|&&id| bus.id_read(id).is_err())
        .map(|id| id.0)
        .collect();
    if !missing.is_empty() {
        return Err(BusError::MissingServos(missing));
    }

    let runtime = Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| BusError::Runtime(e.to_string()))?;

    let (tx, mut rx) = mpsc::channel::<ServoCommand>(cfg.channel_capacity);
    let (stop, mut stop_rx) = watch::channel(false);

    let snapshot = Arc::new(Mutex::new(Err(BusError::NoTelemetry)));
    let snapshot_clone = Arc::clone(&snapshot);

    std::thread::spawn(move || {
        runtime.block_on(async move {
            let mut interval = time::interval(cfg.poll_period);
            let mut previous: HashMap<ServoId, (Instant, f64)> = HashMap::new();

            loop {
                tokio::select! {
                    cmd = rx.recv() => match cmd {
                        Some(cmd) => {
                            if let Err(e) = execute(&bus, cmd) {
                                warn!("command failed: {e}");
                            }
                        }
                        None => break,
                    },
                    // Also fires, with an error, once the handle is dropped.
                    _ = stop_rx.changed() => break,
                    _ = interval.tick() => {
                        let read = poll(&bus, &ids, &mut previous);
                        if let Err(e) = &read {
                            debug!("telemetry poll failed: {e}");
                        }
                        if let Ok(mut guard) = snapshot_clone.lock() {
                            *guard = read;
                        }
                    }
                }
            }
            debug!("control loop stopped");
        });
    });

    Ok(ControlLoopHandle { tx, last_snapshot: snapshot, stop })
}

fn execute<C: ByteChannel>(bus: &ServoBus<C>, cmd: ServoCommand) -> Result<(), BusError> {
    match cmd {
        ServoCommand::Move { id, degrees, seconds } => bus.move_time_write(id, degrees, seconds, false),
        ServoCommand::Stop { id } => bus.move_stop(id),
        ServoCommand::SetPowered { ids, powered } => {
            ids.iter().try_for_each(|&id| bus.set_powered(id, powered))
        }
    }
}

fn poll<C: ByteChannel>(
    bus: &ServoBus<C>,
    ids: &[ServoId],
    previous: &mut HashMap<ServoId, (Instant, f64)>,
) -> Result<BusSnapshot, BusError> {
    let mut servos = Vec::with_capacity(ids.len());
    for &id in ids {
        let mut snap = bus.read_snapshot(id)?;
        let now = Instant::now();
        if let Some((then, position)) = previous.insert(id, (now, snap.position_deg)) {
            let dt = now.duration_since(then).as_secs_f64();
            if dt > 0.0 {
                snap.velocity_dps = Some((snap.position_deg - position) / dt);
            }
        }
        servos.push(snap);
    }
    let timestamp_s = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64();
    Ok(BusSnapshot { servos, timestamp_s })
}
