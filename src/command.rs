//! The LewanSoul command set.
//!
//! Every command has a fixed opcode, a request layout and a response shape.
//! The layouts are plain static data; lookups are exhaustive matches so a new
//! variant cannot be added without describing its wire format.

/// Wire encoding of a single parameter field. Multi-byte fields are
/// little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    I8,
    U16,
    I16,
    /// Reserved byte, written as zero and skipped on decode. Carries no value.
    Pad,
}

impl FieldKind {
    pub const fn width(self) -> usize {
        match self {
            FieldKind::U8 | FieldKind::I8 | FieldKind::Pad => 1,
            FieldKind::U16 | FieldKind::I16 => 2,
        }
    }
}

/// One field of a parameter layout together with its protocol domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub min: i32,
    pub max: i32,
}

impl FieldSpec {
    const fn new(name: &'static str, kind: FieldKind, min: i32, max: i32) -> Self {
        Self { name, kind, min, max }
    }

    pub fn carries_value(&self) -> bool {
        self.kind != FieldKind::Pad
    }
}

/// Total byte width of a layout.
pub fn layout_width(fields: &[FieldSpec]) -> usize {
    fields.iter().map(|f| f.kind.width()).sum()
}

/// Number of parameter values a layout carries (pads excluded).
pub fn value_count(fields: &[FieldSpec]) -> usize {
    fields.iter().filter(|f| f.carries_value()).count()
}

use FieldKind::{Pad, I16, I8, U16, U8};

const PAD: FieldSpec = FieldSpec::new("pad", Pad, 0, 0);

const ANGLE: FieldSpec = FieldSpec::new("angle", U16, 0, 1000);
const TIME: FieldSpec = FieldSpec::new("time", U16, 0, 30_000);
const SERVO_ID: FieldSpec = FieldSpec::new("new id", U8, 0, 253);
const ANGLE_OFFSET: FieldSpec = FieldSpec::new("angle offset", I8, -125, 125);
const MIN_ANGLE: FieldSpec = FieldSpec::new("min angle", U16, 0, 1000);
const MAX_ANGLE: FieldSpec = FieldSpec::new("max angle", U16, 0, 1000);
const MIN_VIN: FieldSpec = FieldSpec::new("min vin", U16, 4500, 12_000);
const MAX_VIN: FieldSpec = FieldSpec::new("max vin", U16, 4500, 12_000);
const TEMP_LIMIT: FieldSpec = FieldSpec::new("temperature limit", U8, 50, 100);
const MODE: FieldSpec = FieldSpec::new("mode", U8, 0, 1);
const SPEED: FieldSpec = FieldSpec::new("speed", I16, -1000, 1000);
const LOAD: FieldSpec = FieldSpec::new("load", U8, 0, 1);
const LED_OFF: FieldSpec = FieldSpec::new("led off", U8, 0, 1);
const LED_TRIGGERS: FieldSpec = FieldSpec::new("led error triggers", U8, 0, 7);

// Response-only fields span the whole wire width; servos report what they measure.
const TEMPERATURE: FieldSpec = FieldSpec::new("temperature", U8, 0, 255);
const VIN: FieldSpec = FieldSpec::new("vin", U16, 0, 65_535);
const POSITION: FieldSpec = FieldSpec::new("position", I16, -32_768, 32_767);

const NONE: &[FieldSpec] = &[];
const MOVE: &[FieldSpec] = &[ANGLE, TIME];
const ANGLE_LIMITS: &[FieldSpec] = &[MIN_ANGLE, MAX_ANGLE];
const VIN_LIMITS: &[FieldSpec] = &[MIN_VIN, MAX_VIN];
const MODE_AND_SPEED: &[FieldSpec] = &[MODE, PAD, SPEED];

/// What a servo sends back after receiving a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// The command is never answered.
    None,
    /// The servo answers with the same opcode and this payload.
    Data(&'static [FieldSpec]),
}

/// Static description of a command, as returned by [`Command::spec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub command: Command,
    pub opcode: u8,
    pub request: &'static [FieldSpec],
    pub response: ResponseShape,
    pub allows_broadcast: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    MoveTimeWrite = 1,
    MoveTimeRead = 2,
    MoveTimeWaitWrite = 7,
    MoveTimeWaitRead = 8,
    MoveStart = 11,
    MoveStop = 12,
    IdWrite = 13,
    IdRead = 14,
    AngleOffsetAdjust = 17,
    AngleOffsetWrite = 18,
    AngleOffsetRead = 19,
    AngleLimitWrite = 20,
    AngleLimitRead = 21,
    VinLimitWrite = 22,
    VinLimitRead = 23,
    TempMaxLimitWrite = 24,
    TempMaxLimitRead = 25,
    TempRead = 26,
    VinRead = 27,
    PosRead = 28,
    ServoOrMotorModeWrite = 29,
    ServoOrMotorModeRead = 30,
    LoadOrUnloadWrite = 31,
    LoadOrUnloadRead = 32,
    LedCtrlWrite = 33,
    LedCtrlRead = 34,
    LedErrorWrite = 35,
    LedErrorRead = 36,
}

impl Command {
    pub const ALL: [Command; 28] = [
        Command::MoveTimeWrite,
        Command::MoveTimeRead,
        Command::MoveTimeWaitWrite,
        Command::MoveTimeWaitRead,
        Command::MoveStart,
        Command::MoveStop,
        Command::IdWrite,
        Command::IdRead,
        Command::AngleOffsetAdjust,
        Command::AngleOffsetWrite,
        Command::AngleOffsetRead,
        Command::AngleLimitWrite,
        Command::AngleLimitRead,
        Command::VinLimitWrite,
        Command::VinLimitRead,
        Command::TempMaxLimitWrite,
        Command::TempMaxLimitRead,
        Command::TempRead,
        Command::VinRead,
        Command::PosRead,
        Command::ServoOrMotorModeWrite,
        Command::ServoOrMotorModeRead,
        Command::LoadOrUnloadWrite,
        Command::LoadOrUnloadRead,
        Command::LedCtrlWrite,
        Command::LedCtrlRead,
        Command::LedErrorWrite,
        Command::LedErrorRead,
    ];

    pub const fn opcode(self) -> u8 {
        self as u8
    }

    pub fn from_opcode(opcode: u8) -> Option<Command> {
        Self::ALL.iter().copied().find(|c| c.opcode() == opcode)
    }

    pub fn request_fields(self) -> &'static [FieldSpec] {
        use Command::*;
        match self {
            MoveTimeWrite | MoveTimeWaitWrite => MOVE,
            IdWrite => &[SERVO_ID],
            AngleOffsetAdjust => &[ANGLE_OFFSET],
            AngleLimitWrite => ANGLE_LIMITS,
            VinLimitWrite => VIN_LIMITS,
            TempMaxLimitWrite => &[TEMP_LIMIT],
            ServoOrMotorModeWrite => MODE_AND_SPEED,
            LoadOrUnloadWrite => &[LOAD],
            LedCtrlWrite => &[LED_OFF],
            LedErrorWrite => &[LED_TRIGGERS],
            MoveTimeRead | MoveTimeWaitRead | MoveStart | MoveStop | IdRead
            | AngleOffsetWrite | AngleOffsetRead | AngleLimitRead | VinLimitRead
            | TempMaxLimitRead | TempRead | VinRead | PosRead | ServoOrMotorModeRead
            | LoadOrUnloadRead | LedCtrlRead | LedErrorRead => NONE,
        }
    }

    pub fn response(self) -> ResponseShape {
        use Command::*;
        use ResponseShape::Data;
        match self {
            MoveTimeRead | MoveTimeWaitRead => Data(MOVE),
            IdRead => Data(&[SERVO_ID]),
            AngleOffsetRead => Data(&[ANGLE_OFFSET]),
            AngleLimitRead => Data(ANGLE_LIMITS),
            VinLimitRead => Data(VIN_LIMITS),
            TempMaxLimitRead => Data(&[TEMP_LIMIT]),
            TempRead => Data(&[TEMPERATURE]),
            VinRead => Data(&[VIN]),
            PosRead => Data(&[POSITION]),
            ServoOrMotorModeRead => Data(MODE_AND_SPEED),
            LoadOrUnloadRead => Data(&[LOAD]),
            LedCtrlRead => Data(&[LED_OFF]),
            LedErrorRead => Data(&[LED_TRIGGERS]),
            MoveTimeWrite | MoveTimeWaitWrite | MoveStart | MoveStop | IdWrite
            | AngleOffsetAdjust | AngleOffsetWrite | AngleLimitWrite | VinLimitWrite
            | TempMaxLimitWrite | ServoOrMotorModeWrite | LoadOrUnloadWrite | LedCtrlWrite
            | LedErrorWrite => ResponseShape::None,
        }
    }

    /// Whether id 254 may address this command. Answered commands never may:
    /// every servo would reply at once. Re-addressing every servo to one id
    /// is refused as well.
    pub fn allows_broadcast(self) -> bool {
        self.response() == ResponseShape::None && self != Command::IdWrite
    }

    pub fn expects_response(self) -> bool {
        self.response() != ResponseShape::None
    }

    pub fn spec(self) -> CommandSpec {
        CommandSpec {
            command: self,
            opcode: self.opcode(),
            request: self.request_fields(),
            response: self.response(),
            allows_broadcast: self.allows_broadcast(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn opcodes_are_unique_and_resolvable() {
        let mut seen = HashSet::new();
        for c in Command::ALL {
            assert!(seen.insert(c.opcode()), "duplicate opcode {}", c.opcode());
            assert_eq!(Command::from_opcode(c.opcode()), Some(c));
        }
        assert_eq!(Command::from_opcode(0), None);
        assert_eq!(Command::from_opcode(3), None);
        assert_eq!(Command::from_opcode(37), None);
    }

    #[test]
    fn reads_have_empty_requests_and_data_responses() {
        for c in Command::ALL {
            if let ResponseShape::Data(fields) = c.response() {
                assert!(c.request_fields().is_empty(), "{c:?} request should be empty");
                assert!(layout_width(fields) > 0);
                assert!(!c.allows_broadcast());
            }
        }
    }

    #[test]
    fn mode_layout_has_pad() {
        let fields = Command::ServoOrMotorModeWrite.request_fields();
        assert_eq!(layout_width(fields), 4);
        assert_eq!(value_count(fields), 2);
    }

    #[test]
    fn spec_mirrors_methods() {
        let spec = Command::MoveStop.spec();
        assert_eq!(spec.opcode, 12);
        assert!(spec.allows_broadcast);
        assert_eq!(spec.response, ResponseShape::None);
        assert!(!Command::IdWrite.allows_broadcast());
    }
}
