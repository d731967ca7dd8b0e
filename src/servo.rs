use std::{fmt, time::Duration};

use crate::{
    bus::ServoBus,
    error::BusError,
    model::{LedErrorTriggers, ServoId, ServoMode, ServoSnapshot, TemperatureUnit},
    transport::ByteChannel,
};

/// A bus paired with one servo id. Every call forwards to [`ServoBus`].
pub struct Servo<'a, C: ByteChannel> {
    bus: &'a ServoBus<C>,
    id: ServoId,
    name: Option<String>,
}

impl<'a, C: ByteChannel> Servo<'a, C> {
    pub fn new(bus: &'a ServoBus<C>, id: ServoId, name: Option<String>) -> Self {
        Self { bus, id, name }
    }

    pub fn id(&self) -> ServoId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn bus(&self) -> &'a ServoBus<C> {
        self.bus
    }

    pub fn move_time_write(&self, degrees: f64, seconds: f64, wait: bool) -> Result<(), BusError> {
        self.bus.move_time_write(self.id, degrees, seconds, wait)
    }

    pub fn move_time_wait_write(&self, degrees: f64, seconds: f64) -> Result<(), BusError> {
        self.bus.move_time_wait_write(self.id, degrees, seconds)
    }

    pub fn move_time_read(&self) -> Result<(f64, f64), BusError> {
        self.bus.move_time_read(self.id)
    }

    pub fn move_time_wait_read(&self) -> Result<(f64, f64), BusError> {
        self.bus.move_time_wait_read(self.id)
    }

    pub fn move_speed_write(&self, degrees: f64, speed_dps: f64, wait: bool) -> Result<(), BusError> {
        self.bus.move_speed_write(self.id, degrees, speed_dps, wait)
    }

    pub fn velocity_read(&self, period: Duration) -> Result<f64, BusError> {
        let v = self.bus.velocity_read(&[self.id], period)?;
        Ok(v[0])
    }

    pub fn move_start(&self) -> Result<(), BusError> {
        self.bus.move_start(self.id)
    }

    pub fn move_stop(&self) -> Result<(), BusError> {
        self.bus.move_stop(self.id)
    }

    /// Re-address the servo and keep following it under the new id.
    pub fn id_write(&mut self, new_id: ServoId) -> Result<(), BusError> {
        self.bus.id_write(self.id, new_id)?;
        self.id = new_id;
        Ok(())
    }

    pub fn id_read(&self) -> Result<ServoId, BusError> {
        self.bus.id_read(self.id)
    }

    pub fn angle_offset_adjust(&self, degrees: f64, persist: bool) -> Result<(), BusError> {
        self.bus.angle_offset_adjust(self.id, degrees, persist)
    }

    pub fn angle_offset_write(&self) -> Result<(), BusError> {
        self.bus.angle_offset_write(self.id)
    }

    pub fn angle_offset_read(&self) -> Result<f64, BusError> {
        self.bus.angle_offset_read(self.id)
    }

    pub fn angle_limit_write(&self, min_degrees: f64, max_degrees: f64) -> Result<(), BusError> {
        self.bus.angle_limit_write(self.id, min_degrees, max_degrees)
    }

    pub fn angle_limit_read(&self) -> Result<(f64, f64), BusError> {
        self.bus.angle_limit_read(self.id)
    }

    pub fn vin_limit_write(&self, min_volts: f64, max_volts: f64) -> Result<(), BusError> {
        self.bus.vin_limit_write(self.id, min_volts, max_volts)
    }

    pub fn vin_limit_read(&self) -> Result<(f64, f64), BusError> {
        self.bus.vin_limit_read(self.id)
    }

    pub fn temp_max_limit_write(&self, temp: f64, unit: TemperatureUnit) -> Result<(), BusError> {
        self.bus.temp_max_limit_write(self.id, temp, unit)
    }

    pub fn temp_max_limit_read(&self, unit: TemperatureUnit) -> Result<f64, BusError> {
        self.bus.temp_max_limit_read(self.id, unit)
    }

    pub fn temp_read(&self, unit: TemperatureUnit) -> Result<f64, BusError> {
        self.bus.temp_read(self.id, unit)
    }

    pub fn vin_read(&self) -> Result<f64, BusError> {
        self.bus.vin_read(self.id)
    }

    pub fn pos_read(&self) -> Result<f64, BusError> {
        self.bus.pos_read(self.id)
    }

    pub fn mode_write(&self, mode: ServoMode) -> Result<(), BusError> {
        self.bus.mode_write(self.id, mode)
    }

    pub fn mode_read(&self) -> Result<ServoMode, BusError> {
        self.bus.mode_read(self.id)
    }

    pub fn set_powered(&self, powered: bool) -> Result<(), BusError> {
        self.bus.set_powered(self.id, powered)
    }

    pub fn is_powered(&self) -> Result<bool, BusError> {
        self.bus.is_powered(self.id)
    }

    pub fn led_ctrl_write(&self, on: bool) -> Result<(), BusError> {
        self.bus.led_ctrl_write(self.id, on)
    }

    pub fn led_ctrl_read(&self) -> Result<bool, BusError> {
        self.bus.led_ctrl_read(self.id)
    }

    pub fn led_error_write(&self, triggers: LedErrorTriggers) -> Result<(), BusError> {
        self.bus.led_error_write(self.id, triggers)
    }

    pub fn led_error_read(&self) -> Result<LedErrorTriggers, BusError> {
        self.bus.led_error_read(self.id)
    }

    pub fn read_snapshot(&self) -> Result<ServoSnapshot, BusError> {
        self.bus.read_snapshot(self.id)
    }
}

impl<C: ByteChannel> fmt::Display for Servo<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (ID {})", self.name.as_deref().unwrap_or("Servo"), self.id)
    }
}
