use crate::{error::BusError, model::TemperatureUnit};

/// Linear mapping between a protocol integer field and a physical quantity:
/// `physical = raw * physical_span / raw_span`.
///
/// Physical to raw rounds half away from zero and then checks the raw domain.
/// Raw to physical is total over every value the wire can carry, so readings
/// outside the writable domain (a position pushed past its stop, say) still
/// convert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitScale {
    pub quantity: &'static str,
    pub unit: &'static str,
    pub raw_min: i32,
    pub raw_max: i32,
    physical_span: f64,
    raw_span: f64,
}

/// 0..=1000 ticks over 0..=240 degrees.
pub const POSITION: UnitScale = UnitScale {
    quantity: "position",
    unit: "deg",
    raw_min: 0,
    raw_max: 1000,
    physical_span: 240.0,
    raw_span: 1000.0,
};

/// Signed offset trim, same 0.24 degree step as [`POSITION`].
pub const ANGLE_OFFSET: UnitScale = UnitScale {
    quantity: "angle offset",
    unit: "deg",
    raw_min: -125,
    raw_max: 125,
    physical_span: 30.0,
    raw_span: 125.0,
};

pub const MOVE_TIME: UnitScale = UnitScale {
    quantity: "move time",
    unit: "s",
    raw_min: 0,
    raw_max: 30_000,
    physical_span: 1.0,
    raw_span: 1000.0,
};

/// Millivolts; the domain is what the input voltage limits accept.
pub const VOLTAGE: UnitScale = UnitScale {
    quantity: "voltage",
    unit: "V",
    raw_min: 4500,
    raw_max: 12_000,
    physical_span: 1.0,
    raw_span: 1000.0,
};

/// Whole degrees Celsius; the domain is what the temperature limit accepts.
pub const TEMPERATURE: UnitScale = UnitScale {
    quantity: "temperature",
    unit: "C",
    raw_min: 50,
    raw_max: 100,
    physical_span: 1.0,
    raw_span: 1.0,
};

impl UnitScale {
    pub fn to_physical(&self, raw: i32) -> f64 {
        f64::from(raw) * self.physical_span / self.raw_span
    }

    pub fn to_raw(&self, value: f64) -> Result<i32, BusError> {
        let raw = (value * self.raw_span / self.physical_span).round();
        if !raw.is_finite() || raw < f64::from(self.raw_min) || raw > f64::from(self.raw_max) {
            return Err(self.out_of_range(value));
        }
        Ok(raw as i32)
    }

    /// Like [`UnitScale::to_raw`] but pins finite values to the domain edges
    /// instead of failing. Only used where the hardware clamps the field
    /// itself (angle limits).
    pub fn to_raw_clamped(&self, value: f64) -> Result<i32, BusError> {
        if value.is_nan() {
            return Err(self.out_of_range(value));
        }
        self.to_raw(value.clamp(self.min_physical(), self.max_physical()))
    }

    pub fn min_physical(&self) -> f64 {
        self.to_physical(self.raw_min)
    }

    pub fn max_physical(&self) -> f64 {
        self.to_physical(self.raw_max)
    }

    fn out_of_range(&self, value: f64) -> BusError {
        BusError::ValueOutOfRange {
            quantity: self.quantity,
            value,
            min: self.min_physical(),
            max: self.max_physical(),
        }
    }
}

pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

pub fn to_celsius(value: f64, unit: TemperatureUnit) -> f64 {
    match unit {
        TemperatureUnit::Celsius => value,
        TemperatureUnit::Fahrenheit => fahrenheit_to_celsius(value),
    }
}

pub fn from_celsius(c: f64, unit: TemperatureUnit) -> f64 {
    match unit {
        TemperatureUnit::Celsius => c,
        TemperatureUnit::Fahrenheit => celsius_to_fahrenheit(c),
    }
}
