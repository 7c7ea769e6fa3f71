//! Shared, message-agnostic primitives for the typed message bus.
//!
//! This crate knows nothing about messages, callbacks, or the bus itself —
//! see the `msgbus` crate for that. It only provides the identity, handle,
//! type-id, logging, and cyclic-buffer building blocks the bus is built on.

mod cyclic_buffer;
mod error;
mod handle;
pub mod handle_registry;
mod instance_id;
mod log;
pub mod type_registry;

pub use cyclic_buffer::CyclicBuffer;
pub use error::BusError;
pub use handle::{HandleCounter, RegistrationHandle};
pub use instance_id::InstanceId;
pub use log::{emit as log_emit, LogLevel, LogSink};
pub use type_registry::MessageTypeId;
