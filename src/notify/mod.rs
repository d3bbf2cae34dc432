// Push channel to dashboard clients

pub mod protocol;
pub mod registry;

pub use protocol::{ClientMessage, ServerMessage};
pub use registry::Notifier;
