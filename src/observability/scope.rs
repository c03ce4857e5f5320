//! Scoped BEGIN/COMPLETE/FAILED logging for multi-step operations
//!
//! `RECONCILE` and `BOOTSTRAP` each open one scope per call. The scope's
//! fields are repeated on every line it emits, so one grep on the anchor
//! finds the whole operation.

use std::cell::Cell;
use std::time::Instant;

use super::logger::Logger;

/// A scope that logs `{name}_BEGIN` on creation and exactly one closing line
///
/// - `complete*()` logs `{name}_COMPLETE` (INFO) with `elapsed_ms`
/// - `fail()` logs `{name}_FAILED` (ERROR) with `reason`
/// - dropping an unclosed scope logs `{name}_INCOMPLETE` (WARN)
pub struct ObservationScope<'a> {
    name: &'a str,
    closed: Cell<bool>,
    fields: Vec<(&'a str, String)>,
    started: Instant,
}

impl<'a> ObservationScope<'a> {
    pub fn new(name: &'a str) -> Self {
        Self::with_fields(name, &[])
    }

    /// Open a scope whose fields appear on every line it logs
    pub fn with_fields(name: &'a str, fields: &[(&'a str, &str)]) -> Self {
        let event = format!("{}_BEGIN", name);
        Logger::info(&event, fields);

        Self {
            name,
            closed: Cell::new(false),
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            started: Instant::now(),
        }
    }

    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    /// Close successfully, adding `extra_fields` to the closing line
    pub fn complete_with_fields(self, extra_fields: &[(&str, &str)]) {
        self.closed.set(true);
        let event = format!("{}_COMPLETE", self.name);
        let elapsed = self.elapsed_ms();

        let mut all_fields = self.field_refs();
        all_fields.extend(extra_fields.iter().copied());
        all_fields.push(("elapsed_ms", elapsed.as_str()));

        Logger::info(&event, &all_fields);
    }

    /// Close with a failure reason
    pub fn fail(self, reason: &str) {
        self.closed.set(true);
        let event = format!("{}_FAILED", self.name);

        let mut all_fields = self.field_refs();
        all_fields.push(("reason", reason));

        Logger::error(&event, &all_fields);
    }

    pub fn is_completed(&self) -> bool {
        self.closed.get()
    }

    fn elapsed_ms(&self) -> String {
        self.started.elapsed().as_millis().to_string()
    }

    fn field_refs(&self) -> Vec<(&str, &str)> {
        self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect()
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.closed.get() {
            let event = format!("{}_INCOMPLETE", self.name);
            let mut all_fields = self.field_refs();
            all_fields.push(("reason", "scope dropped without completion"));
            Logger::warn(&event, &all_fields);
        }
    }
}
