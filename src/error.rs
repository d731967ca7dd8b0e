use thiserror::Error;

use crate::command::Command;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BusError {
    #[error("{field} out of range: got {value}, expected {min}..={max}")]
    ParameterOutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("{quantity} out of range: got {value}, expected {min}..={max}")]
    ValueOutOfRange {
        quantity: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("command {0:?} does not produce a response")]
    UnsupportedCommand(Command),
    #[error("framing error: {reason} (raw {raw:02X?})")]
    FramingError { reason: String, raw: Vec<u8> },
    #[error("checksum mismatch: expected {expected:#04X}, received {actual:#04X} (raw {raw:02X?})")]
    ChecksumMismatch { expected: u8, actual: u8, raw: Vec<u8> },
    #[error("unknown command opcode {opcode} (raw {raw:02X?})")]
    UnknownCommand { opcode: u8, raw: Vec<u8> },
    #[error(
        "response mismatch: expected id {expected_id} command {expected_command:?}, \
         got id {actual_id} opcode {actual_opcode}"
    )]
    ResponseMismatch {
        expected_id: u8,
        actual_id: u8,
        expected_command: Command,
        actual_opcode: u8,
    },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("serial/bus transport error: {0}")]
    Transport(String),
    #[error("timed out waiting for servo {id} to answer {command:?}")]
    Timeout { id: u8, command: Command },
    #[error("missing servos: {0:?}")]
    MissingServos(Vec<u8>),
    #[error("no telemetry sample taken yet")]
    NoTelemetry,
    #[error("async runtime error: {0}")]
    Runtime(String),
    #[error("control loop closed")]
    Closed,
}

impl From<std::io::Error> for BusError {
    fn from(e: std::io::Error) -> Self {
        BusError::Transport(e.to_string())
    }
}
