//! Observability for aerogrant
//!
//! - Structured logging (one JSON line per event, on stderr)
//! - Monotonic counters
//! - Scoped operation tracing
//! - Append-only audit trail of membership changes
//!
//! Observability is read-only: nothing here can fail a membership
//! operation.
//!
//! ```ignore
//! use aerogrant::observability::{Logger, Event, ObservationScope};
//!
//! Logger::info(Event::MembershipGranted.as_str(), &[("principal", "uid:alice")]);
//!
//! let scope = ObservationScope::with_fields("RECONCILE", &[("anchor", "uid:alice")]);
//! scope.complete_with_fields(&[("inserted", "1")]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;
pub mod audit;

pub use audit::{AuditAction, AuditLog, AuditOutcome, AuditRecord, FileAuditLog, MemoryAuditLog};
pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::ObservationScope;

/// Log an event with fields at its natural severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_fatal() {
        Severity::Fatal
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}
