use std::fmt;

use crate::error::BusError;

/// Address of a servo on the shared line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServoId(pub u8);

impl ServoId {
    pub const MIN: ServoId = ServoId(0);
    pub const MAX: ServoId = ServoId(253);
    /// Every servo on the bus acts on packets sent here; none of them answer.
    pub const BROADCAST: ServoId = ServoId(254);

    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }

    /// Checks that the id addresses a single servo (0..=253).
    pub fn check_unicast(self) -> Result<Self, BusError> {
        if self.0 > Self::MAX.0 {
            return Err(BusError::ParameterOutOfRange {
                field: "servo id",
                value: self.0.into(),
                min: Self::MIN.0.into(),
                max: Self::MAX.0.into(),
            });
        }
        Ok(self)
    }
}

impl fmt::Display for ServoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_broadcast() {
            write!(f, "broadcast")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Operating mode reported by `ServoOrMotorModeRead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoMode {
    /// Position control.
    Servo,
    /// Continuous rotation; speed is the raw protocol value in -1000..=1000.
    Motor { speed: i16 },
}

/// Fault conditions that make the servo LED flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedErrorTriggers {
    pub stalled: bool,
    pub over_voltage: bool,
    pub over_temperature: bool,
}

impl LedErrorTriggers {
    pub fn to_bits(self) -> u8 {
        (u8::from(self.stalled) << 2) | (u8::from(self.over_voltage) << 1) | u8::from(self.over_temperature)
    }

    pub fn from_bits(bits: u8) -> Self {
        Self {
            stalled: bits & 0b100 != 0,
            over_voltage: bits & 0b010 != 0,
            over_temperature: bits & 0b001 != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

/// One telemetry sample for a single servo.
#[derive(Debug, Clone, PartialEq)]
pub struct ServoSnapshot {
    pub id: ServoId,
    pub position_deg: f64,
    /// Only known once two samples have been taken.
    pub velocity_dps: Option<f64>,
    pub angle_offset_deg: f64,
    pub temperature_c: f64,
    pub voltage_v: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn led_trigger_bits() {
        let t = LedErrorTriggers { stalled: true, over_voltage: false, over_temperature: true };
        assert_eq!(t.to_bits(), 0b101);
        assert_eq!(LedErrorTriggers::from_bits(0b101), t);
        assert_eq!(LedErrorTriggers::from_bits(0), LedErrorTriggers::default());
    }

    #[test]
    fn unicast_check_rejects_broadcast_and_invalid() {
        assert!(ServoId(253).check_unicast().is_ok());
        assert!(matches!(
            ServoId::BROADCAST.check_unicast(),
            Err(BusError::ParameterOutOfRange { value: 254, .. })
        ));
        assert!(ServoId(255).check_unicast().is_err());
    }
}
