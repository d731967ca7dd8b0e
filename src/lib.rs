pub mod bus;
pub mod command;
pub mod control_loop;
pub mod conversion;
pub mod error;
pub mod mock;
pub mod model;
mod operations;
pub mod packet;
pub mod servo;
pub mod transport;
pub mod transport_serial;

pub use bus::{BusConfig, ServoBus, TransactionState};
pub use command::{Command, CommandSpec, FieldKind, FieldSpec, ResponseShape};
pub use control_loop::{
    start_control_loop, BusSnapshot, ControlLoopConfig, ControlLoopHandle, ServoCommand,
};
pub use conversion::UnitScale;
pub use error::BusError;
pub use mock::{MockChannel, SimulatedBus, SimulatedServo};
pub use model::{LedErrorTriggers, ServoId, ServoMode, ServoSnapshot, TemperatureUnit};
pub use packet::{decode, encode, Packet};
pub use servo::Servo;
pub use transport::ByteChannel;
pub use transport_serial::{SerialChannel, SerialConfig};
