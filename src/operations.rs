//! Typed commands: one transaction plus one unit conversion each.

use std::{
    thread,
    time::{Duration, Instant},
};

use crate::{
    bus::ServoBus,
    command::Command,
    conversion::{from_celsius, to_celsius, ANGLE_OFFSET, MOVE_TIME, POSITION, TEMPERATURE, VOLTAGE},
    error::BusError,
    model::{LedErrorTriggers, ServoId, ServoMode, ServoSnapshot, TemperatureUnit},
    transport::ByteChannel,
};

impl<C: ByteChannel> ServoBus<C> {
    /// Move to `degrees` over `seconds`, starting immediately. With `wait`,
    /// block for the commanded duration afterwards; the servo never
    /// acknowledges moves, so this is a local timer.
    pub fn move_time_write(&self, id: ServoId, degrees: f64, seconds: f64, wait: bool) -> Result<(), BusError> {
        let ms = self.move_time(id, Command::MoveTimeWrite, degrees, seconds)?;
        if wait {
            thread::sleep(Duration::from_millis(ms as u64));
        }
        Ok(())
    }

    /// Queue a move that starts on [`ServoBus::move_start`].
    pub fn move_time_wait_write(&self, id: ServoId, degrees: f64, seconds: f64) -> Result<(), BusError> {
        self.move_time(id, Command::MoveTimeWaitWrite, degrees, seconds).map(|_| ())
    }

    fn move_time(&self, id: ServoId, command: Command, degrees: f64, seconds: f64) -> Result<i32, BusError> {
        let ticks = POSITION.to_raw(degrees)?;
        let ms = MOVE_TIME.to_raw(seconds)?;
        self.transact(id, command, &[ticks, ms])?;
        Ok(ms)
    }

    /// Target and duration of the last immediate move, in degrees and seconds.
    pub fn move_time_read(&self, id: ServoId) -> Result<(f64, f64), BusError> {
        self.read_move(id, Command::MoveTimeRead)
    }

    pub fn move_time_wait_read(&self, id: ServoId) -> Result<(f64, f64), BusError> {
        self.read_move(id, Command::MoveTimeWaitRead)
    }

    fn read_move(&self, id: ServoId, command: Command) -> Result<(f64, f64), BusError> {
        let p = self.query(id, command)?;
        Ok((POSITION.to_physical(p[0]), MOVE_TIME.to_physical(p[1])))
    }

    /// Move at roughly `speed_dps` degrees per second from the current
    /// position, which is read first.
    pub fn move_speed_write(&self, id: ServoId, degrees: f64, speed_dps: f64, wait: bool) -> Result<(), BusError> {
        if !(speed_dps.is_finite() && speed_dps > 0.0) {
            return Err(BusError::InvalidArgument(format!("speed must be positive, got {speed_dps}")));
        }
        let current = self.pos_read(id)?;
        let seconds = (degrees - current).abs() / speed_dps;
        self.move_time_write(id, degrees, seconds, wait)
    }

    /// Estimate angular velocity (deg/s) from two position samples `period` apart.
    pub fn velocity_read(&self, ids: &[ServoId], period: Duration) -> Result<Vec<f64>, BusError> {
        let first = self.sample_positions(ids)?;
        thread::sleep(period);
        let second = self.sample_positions(ids)?;
        Ok(first
            .iter()
            .zip(&second)
            .map(|((t0, p0), (t1, p1))| (p1 - p0) / t1.duration_since(*t0).as_secs_f64())
            .collect())
    }

    fn sample_positions(&self, ids: &[ServoId]) -> Result<Vec<(Instant, f64)>, BusError> {
        ids.iter()
            .map(|&id| self.pos_read(id).map(|deg| (Instant::now(), deg)))
            .collect()
    }

    pub fn move_start(&self, id: ServoId) -> Result<(), BusError> {
        self.transact(id, Command::MoveStart, &[]).map(|_| ())
    }

    pub fn move_stop(&self, id: ServoId) -> Result<(), BusError> {
        self.transact(id, Command::MoveStop, &[]).map(|_| ())
    }

    /// Re-address a servo. Nothing is sent when the ids are equal.
    pub fn id_write(&self, old: ServoId, new: ServoId) -> Result<(), BusError> {
        old.check_unicast()?;
        new.check_unicast()?;
        if old == new {
            return Ok(());
        }
        self.transact(old, Command::IdWrite, &[i32::from(new.0)]).map(|_| ())
    }

    pub fn id_read(&self, id: ServoId) -> Result<ServoId, BusError> {
        let p = self.query(id, Command::IdRead)?;
        Ok(ServoId(p[0] as u8))
    }

    /// Trim the zero position by up to ±30 degrees. With `persist`, also save
    /// it so it survives a power cycle.
    pub fn angle_offset_adjust(&self, id: ServoId, degrees: f64, persist: bool) -> Result<(), BusError> {
        let raw = ANGLE_OFFSET.to_raw(degrees)?;
        self.transact(id, Command::AngleOffsetAdjust, &[raw])?;
        if persist {
            self.angle_offset_write(id)?;
        }
        Ok(())
    }

    pub fn angle_offset_write(&self, id: ServoId) -> Result<(), BusError> {
        self.transact(id, Command::AngleOffsetWrite, &[]).map(|_| ())
    }

    pub fn angle_offset_read(&self, id: ServoId) -> Result<f64, BusError> {
        let p = self.query(id, Command::AngleOffsetRead)?;
        Ok(ANGLE_OFFSET.to_physical(p[0]))
    }

    /// Set soft travel limits. Both limits are clamped into 0..=240 degrees,
    /// as the servo does; they must remain strictly ordered afterwards.
    pub fn angle_limit_write(&self, id: ServoId, min_degrees: f64, max_degrees: f64) -> Result<(), BusError> {
        let min = POSITION.to_raw_clamped(min_degrees)?;
        let max = POSITION.to_raw_clamped(max_degrees)?;
        if min >= max {
            return Err(BusError::InvalidArgument(format!(
                "min angle {min_degrees} must be below max angle {max_degrees}"
            )));
        }
        self.transact(id, Command::AngleLimitWrite, &[min, max]).map(|_| ())
    }

    pub fn angle_limit_read(&self, id: ServoId) -> Result<(f64, f64), BusError> {
        let p = self.query(id, Command::AngleLimitRead)?;
        Ok((POSITION.to_physical(p[0]), POSITION.to_physical(p[1])))
    }

    /// Input voltage window in volts, each within 4.5..=12.
    pub fn vin_limit_write(&self, id: ServoId, min_volts: f64, max_volts: f64) -> Result<(), BusError> {
        let min = VOLTAGE.to_raw(min_volts)?;
        let max = VOLTAGE.to_raw(max_volts)?;
        if min > max {
            return Err(BusError::InvalidArgument(format!(
                "min voltage {min_volts} must not exceed max voltage {max_volts}"
            )));
        }
        self.transact(id, Command::VinLimitWrite, &[min, max]).map(|_| ())
    }

    pub fn vin_limit_read(&self, id: ServoId) -> Result<(f64, f64), BusError> {
        let p = self.query(id, Command::VinLimitRead)?;
        Ok((VOLTAGE.to_physical(p[0]), VOLTAGE.to_physical(p[1])))
    }

    pub fn temp_max_limit_write(&self, id: ServoId, temp: f64, unit: TemperatureUnit) -> Result<(), BusError> {
        let raw = TEMPERATURE.to_raw(to_celsius(temp, unit))?;
        self.transact(id, Command::TempMaxLimitWrite, &[raw]).map(|_| ())
    }

    pub fn temp_max_limit_read(&self, id: ServoId, unit: TemperatureUnit) -> Result<f64, BusError> {
        let p = self.query(id, Command::TempMaxLimitRead)?;
        Ok(from_celsius(TEMPERATURE.to_physical(p[0]), unit))
    }

    pub fn temp_read(&self, id: ServoId, unit: TemperatureUnit) -> Result<f64, BusError> {
        let p = self.query(id, Command::TempRead)?;
        Ok(from_celsius(TEMPERATURE.to_physical(p[0]), unit))
    }

    /// Supply voltage in volts.
    pub fn vin_read(&self, id: ServoId) -> Result<f64, BusError> {
        let p = self.query(id, Command::VinRead)?;
        Ok(VOLTAGE.to_physical(p[0]))
    }

    /// Current position in degrees. Can fall slightly outside 0..=240 when
    /// the horn is forced past its stops.
    pub fn pos_read(&self, id: ServoId) -> Result<f64, BusError> {
        let p = self.query(id, Command::PosRead)?;
        Ok(POSITION.to_physical(p[0]))
    }

    pub fn mode_write(&self, id: ServoId, mode: ServoMode) -> Result<(), BusError> {
        let params = match mode {
            ServoMode::Servo => [0, 0],
            ServoMode::Motor { speed } => [1, i32::from(speed)],
        };
        self.transact(id, Command::ServoOrMotorModeWrite, &params).map(|_| ())
    }

    pub fn mode_read(&self, id: ServoId) -> Result<ServoMode, BusError> {
        let p = self.query(id, Command::ServoOrMotorModeRead)?;
        match p[0] {
            0 => Ok(ServoMode::Servo),
            1 => Ok(ServoMode::Motor { speed: p[1] as i16 }),
            other => Err(BusError::InvalidResponse(format!("unknown mode {other}"))),
        }
    }

    /// Load (`true`) or unload the motor.
    pub fn set_powered(&self, id: ServoId, powered: bool) -> Result<(), BusError> {
        self.transact(id, Command::LoadOrUnloadWrite, &[i32::from(powered)]).map(|_| ())
    }

    pub fn is_powered(&self, id: ServoId) -> Result<bool, BusError> {
        let p = self.query(id, Command::LoadOrUnloadRead)?;
        Ok(p[0] != 0)
    }

    /// Steady LED on (`true`) or off while no fault is flagged.
    pub fn led_ctrl_write(&self, id: ServoId, on: bool) -> Result<(), BusError> {
        // The register stores "LED off".
        self.transact(id, Command::LedCtrlWrite, &[i32::from(!on)]).map(|_| ())
    }

    pub fn led_ctrl_read(&self, id: ServoId) -> Result<bool, BusError> {
        let p = self.query(id, Command::LedCtrlRead)?;
        Ok(p[0] == 0)
    }

    pub fn led_error_write(&self, id: ServoId, triggers: LedErrorTriggers) -> Result<(), BusError> {
        self.transact(id, Command::LedErrorWrite, &[i32::from(triggers.to_bits())]).map(|_| ())
    }

    pub fn led_error_read(&self, id: ServoId) -> Result<LedErrorTriggers, BusError> {
        let p = self.query(id, Command::LedErrorRead)?;
        Ok(LedErrorTriggers::from_bits(p[0] as u8))
    }

    /// Position, offset, temperature and voltage in four transactions.
    /// Velocity is left unset; it needs a previous sample.
    pub fn read_snapshot(&self, id: ServoId) -> Result<ServoSnapshot, BusError> {
        Ok(ServoSnapshot {
            id,
            position_deg: self.pos_read(id)?,
            velocity_dps: None,
            angle_offset_deg: self.angle_offset_read(id)?,
            temperature_c: self.temp_read(id, TemperatureUnit::Celsius)?,
            voltage_v: self.vin_read(id)?,
        })
    }
}
