//! Request/response exchanges on a shared half-duplex line.
//!
//! Each call is one attempt. The bus mutex is held from the write until the
//! response has been read, so concurrent callers never interleave frames.
//! The reader skips an exact copy of the transmitted packet (adapter echo)
//! and rescans one byte later when a sync marker turns out to be noise.

use std::{
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};

use tracing::{debug, trace, warn};

use crate::{
    command::{value_count, Command, ResponseShape},
    error::BusError,
    model::ServoId,
    packet::{decode, encode, scan_frame, FrameScan, Packet},
    servo::Servo,
    transport::ByteChannel,
};

#[derive(Debug, Clone, Copy)]
pub struct BusConfig {
    /// Deadline for a response to arrive, counted from the end of the write.
    pub timeout: Duration,
    /// Read back and verify the transmitted bytes after each write (RS-485
    /// adapters that hear themselves).
    pub discard_echo: bool,
    /// Broadcast "load" when the bus is created.
    pub power_on_at_open: bool,
    /// Broadcast "unload" when the bus is closed or dropped.
    pub power_off_at_close: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            discard_echo: false,
            power_on_at_open: false,
            power_off_at_close: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Sending,
    AwaitingResponse,
    Completed,
    TimedOut,
    Failed,
}

struct Inner<C> {
    channel: C,
    state: TransactionState,
    /// Bytes read past an echo, handed to the response reader.
    pushback: Vec<u8>,
}

pub struct ServoBus<C: ByteChannel> {
    inner: Mutex<Inner<C>>,
    config: BusConfig,
    closed: bool,
}

impl<C: ByteChannel> ServoBus<C> {
    pub fn new(channel: C, config: BusConfig) -> Result<Self, BusError> {
        let bus = Self {
            inner: Mutex::new(Inner { channel, state: TransactionState::Idle, pushback: Vec::new() }),
            config,
            closed: false,
        };
        if config.power_on_at_open {
            bus.set_powered(ServoId::BROADCAST, true)?;
        }
        Ok(bus)
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Terminal state of the most recent transaction, `Idle` before the first.
    pub fn last_state(&self) -> TransactionState {
        self.lock().state
    }

    pub fn servo(&self, id: ServoId) -> Servo<'_, C> {
        Servo::new(self, id, None)
    }

    pub fn named_servo(&self, id: ServoId, name: impl Into<String>) -> Servo<'_, C> {
        Servo::new(self, id, Some(name.into()))
    }

    /// Send one command. Answered commands return the validated response;
    /// unanswered ones return `None` as soon as the write completes.
    pub fn transact(
        &self,
        id: ServoId,
        command: Command,
        params: &[i32],
    ) -> Result<Option<Packet>, BusError> {
        let frame = encode(id, command, params)?;
        let mut inner = self.lock();
        inner.exchange(&frame, id, command, &self.config)
    }

    /// Send a read command and return the response params.
    pub fn query(&self, id: ServoId, command: Command) -> Result<Vec<i32>, BusError> {
        if command.response() == ResponseShape::None {
            return Err(BusError::UnsupportedCommand(command));
        }
        match self.transact(id, command, &[])? {
            Some(packet) => Ok(packet.params),
            None => Err(BusError::UnsupportedCommand(command)),
        }
    }

    /// Broadcast the configured power-off and release the channel.
    pub fn close(mut self) -> Result<(), BusError> {
        self.closed = true;
        if self.config.power_off_at_close {
            self.set_powered(ServoId::BROADCAST, false)?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner<C>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl<C: ByteChannel> Drop for ServoBus<C> {
    fn drop(&mut self) {
        if self.closed || !self.config.power_off_at_close {
            return;
        }
        if let Err(e) = self.set_powered(ServoId::BROADCAST, false) {
            warn!("power off on drop failed: {e}");
        }
    }
}

impl<C: ByteChannel> Inner<C> {
    fn enter(&mut self, state: TransactionState) {
        trace!(from = ?self.state, to = ?state, "transaction state");
        self.state = state;
    }

    fn exchange(
        &mut self,
        frame: &[u8],
        id: ServoId,
        command: Command,
        config: &BusConfig,
    ) -> Result<Option<Packet>, BusError> {
        self.enter(TransactionState::Sending);
        debug!(%id, ?command, tx = ?frame, "send");
        if let Err(e) = self.send(frame, config) {
            self.enter(TransactionState::Failed);
            return Err(e);
        }

        if !command.expects_response() {
            self.enter(TransactionState::Completed);
            return Ok(None);
        }

        self.enter(TransactionState::AwaitingResponse);
        let deadline = Instant::now() + config.timeout;
        let result = self
            .read_frame(frame, id, command, deadline)
            .and_then(|packet| check_response(packet, id, command));

        match result {
            Ok(packet) => {
                self.enter(TransactionState::Completed);
                Ok(Some(packet))
            }
            Err(e @ BusError::Timeout { .. }) => {
                self.enter(TransactionState::TimedOut);
                Err(e)
            }
            Err(e) => {
                self.enter(TransactionState::Failed);
                Err(e)
            }
        }
    }

    fn send(&mut self, frame: &[u8], config: &BusConfig) -> Result<(), BusError> {
        self.pushback.clear();
        self.channel.clear_input()?;
        self.channel.write(frame)?;
        if config.discard_echo {
            self.discard_echo(frame, config.timeout)?;
        }
        Ok(())
    }

    fn discard_echo(&mut self, frame: &[u8], timeout: Duration) -> Result<(), BusError> {
        let deadline = Instant::now() + timeout;
        let mut echo = Vec::with_capacity(frame.len());
        while echo.len() < frame.len() {
            if !self.read_more(&mut echo, deadline)? {
                return Err(BusError::Transport(format!(
                    "echo incomplete: {} of {} bytes",
                    echo.len(),
                    frame.len()
                )));
            }
        }
        // Anything past the echo is the start of the response.
        let rest = echo.split_off(frame.len());
        if echo != frame {
            return Err(BusError::FramingError {
                reason: "echo does not match transmitted packet".into(),
                raw: echo,
            });
        }
        self.pushback = rest;
        Ok(())
    }

    fn read_frame(
        &mut self,
        sent: &[u8],
        id: ServoId,
        command: Command,
        deadline: Instant,
    ) -> Result<Packet, BusError> {
        let mut buf = std::mem::take(&mut self.pushback);
        let mut rejected = None;
        loop {
            match scan_frame(&buf) {
                FrameScan::Complete { start, end } => {
                    if start > 0 {
                        warn!(skipped = ?&buf[..start], "discarded bytes before sync marker");
                    }
                    let frame = &buf[start..end];
                    if frame == sent {
                        debug!(%id, ?command, "skipped echo of transmitted packet");
                        buf.drain(..end);
                        continue;
                    }
                    match decode(frame) {
                        Ok(packet) => {
                            if end < buf.len() {
                                debug!(extra = ?&buf[end..], "discarded bytes after frame");
                            }
                            debug!(%id, ?command, rx = ?frame, "receive");
                            return Ok(packet);
                        }
                        // A sync marker inside noise; look again one byte later.
                        Err(e @ (BusError::FramingError { .. } | BusError::ChecksumMismatch { .. })) => {
                            debug!(error = %e, "rejected candidate frame");
                            rejected = Some(e);
                            buf.drain(..=start);
                        }
                        Err(e) => return Err(e),
                    }
                }
                FrameScan::Incomplete { skip } => {
                    if skip > 0 {
                        warn!(skipped = ?&buf[..skip], "discarded bytes before sync marker");
                        buf.drain(..skip);
                    }
                    if !self.read_more(&mut buf, deadline)? {
                        return Err(rejected.unwrap_or(BusError::Timeout { id: id.0, command }));
                    }
                }
            }
        }
    }

    /// Append the next chunk; `false` once the deadline passes with nothing read.
    fn read_more(&mut self, buf: &mut Vec<u8>, deadline: Instant) -> Result<bool, BusError> {
        let mut chunk = [0u8; 64];
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let n = self.channel.read_available(&mut chunk, deadline - now)?;
            if n > 0 {
                buf.extend_from_slice(&chunk[..n]);
                return Ok(true);
            }
        }
    }
}

/// The answer must come from the addressed servo, for the same command, with
/// the full response payload.
fn check_response(packet: Packet, id: ServoId, command: Command) -> Result<Packet, BusError> {
    if packet.id != id || packet.command != command {
        return Err(BusError::ResponseMismatch {
            expected_id: id.0,
            actual_id: packet.id.0,
            expected_command: command,
            actual_opcode: packet.command.opcode(),
        });
    }
    let expected = match command.response() {
        ResponseShape::Data(fields) => value_count(fields),
        ResponseShape::None => 0,
    };
    if packet.params.len() != expected {
        return Err(BusError::InvalidResponse(format!(
            "{command:?} answered with {} values, expected {expected}",
            packet.params.len()
        )));
    }
    Ok(packet)
}
