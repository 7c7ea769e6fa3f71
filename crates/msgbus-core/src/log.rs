//! The bus's pluggable log sink (`spec.md` §6).
//!
//! This is deliberately separate from the `tracing` spans the `msgbus` crate
//! emits around its own dispatch pipeline — see `SPEC_FULL.md` §13. The sink
//! is how a host without a `tracing` subscriber wired up still observes
//! `OverDeregistration`, `InvalidRegistration`, and similar conditions.

use std::fmt;
use std::rc::Rc;

/// Severity of a sink-routed log line, matching `tracing::Level`'s ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
	Trace,
	Debug,
	Info,
	Warn,
	Error,
}

impl fmt::Display for LogLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			LogLevel::Trace => "TRACE",
			LogLevel::Debug => "DEBUG",
			LogLevel::Info => "INFO",
			LogLevel::Warn => "WARN",
			LogLevel::Error => "ERROR",
		};
		f.write_str(label)
	}
}

/// A single pluggable callback: `(level, message)`.
///
/// Not `Send`/`Sync` by design — the bus is confined to one logical thread
/// of control (`spec.md` §5), so the sink may freely close over `Rc`/`RefCell`
/// state owned by the embedding host.
pub type LogSink = Rc<dyn Fn(LogLevel, &str)>;

/// Routes a line to `sink` if present and `level` clears `gate`.
pub fn emit(sink: Option<&LogSink>, gate: LogLevel, level: LogLevel, message: fmt::Arguments<'_>) {
	if level < gate {
		return;
	}
	if let Some(sink) = sink {
		sink(level, &message.to_string());
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::RefCell;

	#[test]
	fn gate_suppresses_lower_levels() {
		let seen: Rc<RefCell<Vec<(LogLevel, String)>>> = Rc::new(RefCell::new(Vec::new()));
		let sink: LogSink = {
			let seen = seen.clone();
			Rc::new(move |level, message: &str| seen.borrow_mut().push((level, message.to_string())))
		};
		emit(Some(&sink), LogLevel::Warn, LogLevel::Trace, format_args!("hi"));
		emit(Some(&sink), LogLevel::Warn, LogLevel::Error, format_args!("bye"));
		let recorded = seen.borrow();
		assert_eq!(recorded.len(), 1);
		assert_eq!(recorded[0].0, LogLevel::Error);
	}

	#[test]
	fn no_sink_is_a_no_op() {
		emit(None, LogLevel::Trace, LogLevel::Error, format_args!("nobody home"));
	}
}
