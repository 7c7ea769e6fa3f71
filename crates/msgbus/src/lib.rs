//! In-process typed message bus: untargeted/targeted/broadcast dispatch
//! through a deterministic five-stage pipeline, with interceptors, a single
//! type-erased global listener, and post-processors that see a frozen
//! snapshot of every priority present during an emission.
//!
//! [`MessageBus`] is the dispatcher itself; [`RegistrationToken`] and
//! [`MessageHandler`] are the two ways callers manage a bundle of
//! registrations as a unit. The free functions in this crate root
//! (`emit_untargeted`, `emit_targeted`, `emit_broadcast`, ...) are the
//! ergonomic entry points most callers reach for; `msgbus_core` holds the
//! primitives (`InstanceId`, `RegistrationHandle`, `MessageTypeId`, the log
//! sink, the cyclic buffer) this crate is built on.

mod bus;
mod diagnostics;
mod emit;
mod handler;
mod message;
mod mode;
mod priority_list;
mod registration;
mod state;
mod token;

pub use bus::{MessageBus, RetractFn};
pub use diagnostics::{entries as diagnostic_entries, len as diagnostic_len, DiagnosticEntry};
pub use emit::{emit_broadcast, emit_broadcast_on, emit_targeted, emit_targeted_on, emit_untargeted, emit_untargeted_on, AsInstanceId};
pub use handler::MessageHandler;
pub use message::Message;
pub use mode::Mode;
pub use state::{
	diagnostic_buffer_size, diagnostics_enabled, global_bus, next_synthetic_owner, reset, set_diagnostic_buffer_size,
	set_diagnostics_enabled,
};
pub use token::{Disposable, RebindMode, RegistrationToken};

pub use msgbus_core::{type_registry, BusError, HandleCounter, InstanceId, LogLevel, LogSink, MessageTypeId, RegistrationHandle};
