//! In-memory channels for exercising the bus without hardware.
//!
//! [`MockChannel`] replays scripted replies, one per write. [`SimulatedBus`]
//! decodes what the host sends and answers like a line of real servos.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};

use tracing::trace;

use crate::{
    command::Command,
    error::BusError,
    model::ServoId,
    packet::{decode, encode_response, Packet},
    transport::ByteChannel,
};

#[derive(Debug, Default)]
struct MockState {
    rx: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    echo: bool,
    fail_writes: bool,
    chunk_size: Option<usize>,
    clears: usize,
}

/// Scripted channel. Clones share state, so a test can keep one clone to
/// script and inspect while the bus owns another.
#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Bytes delivered after the next write that finds no earlier reply queued.
    pub fn queue_reply(&self, bytes: impl Into<Vec<u8>>) {
        self.lock().replies.push_back(bytes.into());
    }

    /// Let the next write go unanswered.
    pub fn queue_silence(&self) {
        self.queue_reply(Vec::new());
    }

    /// Reflect every written byte back, as RS-485 adapters do.
    pub fn set_echo(&self, echo: bool) {
        self.lock().echo = echo;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Deliver at most `n` bytes per read.
    pub fn set_chunk_size(&self, n: usize) {
        self.lock().chunk_size = Some(n.max(1));
    }

    /// Every successful write, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.lock().written.clone()
    }

    pub fn clear_count(&self) -> usize {
        self.lock().clears
    }

    pub fn pending_replies(&self) -> usize {
        self.lock().replies.len()
    }
}

impl ByteChannel for MockChannel {
    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(BusError::Transport("mock write failure".into()));
        }
        state.written.push(bytes.to_vec());
        if state.echo {
            state.rx.extend(bytes);
        }
        if let Some(reply) = state.replies.pop_front() {
            state.rx.extend(reply);
        }
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8], max_wait: Duration) -> Result<usize, BusError> {
        read_from(&self.state, buf, max_wait, |s| &mut s.rx, |s| s.chunk_size)
    }

    fn clear_input(&mut self) -> Result<(), BusError> {
        let mut state = self.lock();
        state.rx.clear();
        state.clears += 1;
        Ok(())
    }
}

fn read_from<S>(
    state: &Mutex<S>,
    buf: &mut [u8],
    max_wait: Duration,
    rx: impl Fn(&mut S) -> &mut VecDeque<u8>,
    chunk: impl Fn(&S) -> Option<usize>,
) -> Result<usize, BusError> {
    let lock = || state.lock().unwrap_or_else(|p| p.into_inner());
    if rx(&mut *lock()).is_empty() {
        // Nothing is ever produced while the host waits, so this is a timeout.
        thread::sleep(max_wait);
    }
    let mut guard = lock();
    let limit = chunk(&*guard).unwrap_or(usize::MAX).min(buf.len());
    let queue = rx(&mut *guard);
    let n = limit.min(queue.len());
    for (slot, byte) in buf.iter_mut().zip(queue.drain(..n)) {
        *slot = byte;
    }
    Ok(n)
}

/// Register state of one simulated servo.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedServo {
    pub position: i32,
    pub move_target: (i32, i32),
    pub pending_move: Option<(i32, i32)>,
    pub angle_offset: i32,
    pub angle_limits: (i32, i32),
    pub vin_limits: (i32, i32),
    pub temp_limit: i32,
    pub temperature: i32,
    pub vin_mv: i32,
    pub motor_speed: Option<i32>,
    pub powered: bool,
    pub led_off: bool,
    pub led_triggers: i32,
}

impl Default for SimulatedServo {
    fn default() -> Self {
        Self {
            position: 500,
            move_target: (500, 0),
            pending_move: None,
            angle_offset: 0,
            angle_limits: (0, 1000),
            vin_limits: (4500, 12_000),
            temp_limit: 85,
            temperature: 30,
            vin_mv: 7400,
            motor_speed: None,
            powered: false,
            led_off: false,
            led_triggers: 0b111,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    servos: BTreeMap<u8, SimulatedServo>,
    rx: VecDeque<u8>,
    log: Vec<Packet>,
}

/// A line of servos that answer like the firmware does. Moves complete
/// instantly. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBus {
    pub fn new(ids: &[ServoId]) -> Self {
        let sim = Self::default();
        for id in ids {
            sim.insert(*id, SimulatedServo::default());
        }
        sim
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn insert(&self, id: ServoId, servo: SimulatedServo) {
        self.lock().servos.insert(id.0, servo);
    }

    pub fn servo(&self, id: ServoId) -> Option<SimulatedServo> {
        self.lock().servos.get(&id.0).cloned()
    }

    pub fn update(&self, id: ServoId, f: impl FnOnce(&mut SimulatedServo)) {
        if let Some(servo) = self.lock().servos.get_mut(&id.0) {
            f(servo);
        }
    }

    /// Every well-formed packet the host sent, in order.
    pub fn received(&self) -> Vec<Packet> {
        self.lock().log.clone()
    }
}

impl ByteChannel for SimulatedBus {
    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        let mut state = self.lock();
        let packet = match decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                // Firmware drops corrupt packets silently.
                trace!(error = %e, "simulated bus ignored packet");
                return Ok(());
            }
        };
        state.log.push(packet.clone());

        let targets: Vec<u8> = if packet.id.is_broadcast() {
            state.servos.keys().copied().collect()
        } else {
            vec![packet.id.0]
        };
        for id in targets {
            let Some(servo) = state.servos.get_mut(&id) else { continue };
            if let Some(reply) = apply(ServoId(id), servo, &packet) {
                let frame = encode_response(ServoId(id), packet.command, &reply)?;
                state.rx.extend(frame);
            }
            if let (Command::IdWrite, Some(&new_id)) = (packet.command, packet.params.first()) {
                if let Some(servo) = state.servos.remove(&id) {
                    state.servos.insert(new_id as u8, servo);
                }
            }
        }
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8], max_wait: Duration) -> Result<usize, BusError> {
        read_from(&self.state, buf, max_wait, |s| &mut s.rx, |_| None)
    }

    fn clear_input(&mut self) -> Result<(), BusError> {
        self.lock().rx.clear();
        Ok(())
    }
}

/// Apply one command to a servo, returning reply params for reads.
fn apply(id: ServoId, servo: &mut SimulatedServo, packet: &Packet) -> Option<Vec<i32>> {
    let p = &packet.params;
    match packet.command {
        Command::MoveTimeWrite => {
            // Firmware loads the motor on any move.
            servo.move_target = (p[0], p[1]);
            servo.powered = true;
            if servo.motor_speed.is_none() {
                servo.position = p[0].clamp(servo.angle_limits.0, servo.angle_limits.1);
            }
            None
        }
        Command::MoveTimeWaitWrite => {
            servo.pending_move = Some((p[0], p[1]));
            None
        }
        Command::MoveStart => {
            if let Some((target, time)) = servo.pending_move.take() {
                servo.move_target = (target, time);
                servo.powered = true;
                servo.position = target.clamp(servo.angle_limits.0, servo.angle_limits.1);
            }
            None
        }
        Command::MoveTimeRead => Some(vec![servo.move_target.0, servo.move_target.1]),
        Command::MoveTimeWaitRead => {
            let (target, time) = servo.pending_move.unwrap_or(servo.move_target);
            Some(vec![target, time])
        }
        Command::MoveStop | Command::AngleOffsetWrite | Command::IdWrite => None,
        Command::IdRead => Some(vec![i32::from(id.0)]),
        Command::AngleOffsetAdjust => {
            servo.angle_offset = p[0];
            None
        }
        Command::AngleOffsetRead => Some(vec![servo.angle_offset]),
        Command::AngleLimitWrite => {
            servo.angle_limits = (p[0], p[1]);
            None
        }
        Command::AngleLimitRead => Some(vec![servo.angle_limits.0, servo.angle_limits.1]),
        Command::VinLimitWrite => {
            servo.vin_limits = (p[0], p[1]);
            None
        }
        Command::VinLimitRead => Some(vec![servo.vin_limits.0, servo.vin_limits.1]),
        Command::TempMaxLimitWrite => {
            servo.temp_limit = p[0];
            None
        }
        Command::TempMaxLimitRead => Some(vec![servo.temp_limit]),
        Command::TempRead => Some(vec![servo.temperature]),
        Command::VinRead => Some(vec![servo.vin_mv]),
        Command::PosRead => Some(vec![servo.position]),
        Command::ServoOrMotorModeWrite => {
            servo.motor_speed = (p[0] == 1).then_some(p[1]);
            None
        }
        Command::ServoOrMotorModeRead => match servo.motor_speed {
            Some(speed) => Some(vec![1, speed]),
            None => Some(vec![0, 0]),
        },
        Command::LoadOrUnloadWrite => {
            servo.powered = p[0] == 1;
            None
        }
        Command::LoadOrUnloadRead => Some(vec![i32::from(servo.powered)]),
        Command::LedCtrlWrite => {
            servo.led_off = p[0] == 1;
            None
        }
        Command::LedCtrlRead => Some(vec![i32::from(servo.led_off)]),
        Command::LedErrorWrite => {
            servo.led_triggers = p[0];
            None
        }
        Command::LedErrorRead => Some(vec![servo.led_triggers]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::encode;

    #[test]
    fn mock_delivers_reply_after_write() {
        let mut mock = MockChannel::new();
        mock.queue_reply(vec![1, 2, 3]);
        let mut buf = [0u8; 8];
        assert_eq!(mock.read_available(&mut buf, Duration::from_millis(1)).unwrap(), 0);
        mock.write(&[9]).unwrap();
        assert_eq!(mock.read_available(&mut buf, Duration::from_millis(1)).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(mock.written(), vec![vec![9]]);
    }

    #[test]
    fn mock_chunking() {
        let mut mock = MockChannel::new();
        mock.set_chunk_size(2);
        mock.queue_reply(vec![1, 2, 3]);
        mock.write(&[0]).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(mock.read_available(&mut buf, Duration::ZERO).unwrap(), 2);
        assert_eq!(mock.read_available(&mut buf, Duration::ZERO).unwrap(), 1);
        assert_eq!(buf[0], 3);
    }

    #[test]
    fn simulator_answers_reads_and_ignores_unknown_ids() {
        let mut sim = SimulatedBus::new(&[ServoId(1)]);
        sim.write(&encode(ServoId(1), Command::PosRead, &[]).unwrap()).unwrap();
        let mut buf = [0u8; 16];
        let n = sim.read_available(&mut buf, Duration::ZERO).unwrap();
        let packet = decode(&buf[..n]).unwrap();
        assert_eq!(packet.params, vec![500]);

        sim.write(&encode(ServoId(2), Command::PosRead, &[]).unwrap()).unwrap();
        assert_eq!(sim.read_available(&mut buf, Duration::from_millis(1)).unwrap(), 0);
    }

    #[test]
    fn simulator_broadcast_reaches_every_servo() {
        let mut sim = SimulatedBus::new(&[ServoId(1), ServoId(2)]);
        sim.write(&encode(ServoId::BROADCAST, Command::LoadOrUnloadWrite, &[1]).unwrap())
            .unwrap();
        assert!(sim.servo(ServoId(1)).unwrap().powered);
        assert!(sim.servo(ServoId(2)).unwrap().powered);
    }
}
