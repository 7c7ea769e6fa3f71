use thiserror::Error;

/// Errors surfaced to callers of the public API.
///
/// Everything else in `spec.md` §7 (`OverDeregistration`, `InvalidRegistration`,
/// `ReflexiveDispatchUnresolved`) is a log-only event, not a `Result` — see
/// `SPEC_FULL.md` §14.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
	/// A host-graph reference could not be resolved to an [`InstanceId`](crate::InstanceId).
	///
	/// The bus is never called when this occurs.
	#[error("could not resolve emission target/source to an InstanceId")]
	InvalidTarget,
}
