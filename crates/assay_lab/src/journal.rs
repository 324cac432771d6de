//! Journals receive a digest of every report the laboratory produces.
//!
//! Journals are the publishing side of the laboratory: logging, metrics or
//! files. A failing journal never affects the control result; the
//! laboratory logs the failure and moves on.

use crate::error::{Error, Result};
use crate::observation::panic_message;
use crate::report::ReportDigest;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, warn};

/// Sink for report digests.
pub trait Journal: Send + Sync {
    /// Records one report.
    ///
    /// # Errors
    ///
    /// Returns an error if the report could not be recorded.
    fn record(&self, digest: &ReportDigest) -> Result<()>;
}

/// Logs every report through `tracing`.
///
/// Matching reports are logged at debug level, mismatches at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingJournal;

impl Journal for TracingJournal {
    fn record(&self, digest: &ReportDigest) -> Result<()> {
        if digest.has_mismatches() {
            warn!(
                "Experiment '{}' mismatched: [{}] (control {} in {}us)",
                digest.experiment,
                digest.mismatches.join(", "),
                digest.control.status,
                digest.control.duration_us
            );
            for trial in digest.trials.iter().filter(|t| t.matched == Some(false)) {
                warn!(
                    "  trial '{}' {}: {} (control {}: {})",
                    trial.name,
                    trial.status,
                    trial.detail,
                    digest.control.status,
                    digest.control.detail
                );
            }
        } else {
            debug!(
                "Experiment '{}' matched ({} trials, sampled: {})",
                digest.experiment,
                digest.trials.len(),
                digest.sampled
            );
        }
        Ok(())
    }
}

/// Keeps every digest in memory.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    entries: Mutex<Vec<ReportDigest>>,
}

impl MemoryJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded digests.
    pub fn entries(&self) -> Vec<ReportDigest> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the number of recorded digests.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Journal for MemoryJournal {
    fn record(&self, digest: &ReportDigest) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(digest.clone());
        Ok(())
    }
}

/// Writes one JSON object per line to any writer.
#[derive(Debug)]
pub struct JsonLinesJournal<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesJournal<W> {
    /// Creates a journal writing to `writer`.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consumes the journal and returns the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> Journal for JsonLinesJournal<W> {
    fn record(&self, digest: &ReportDigest) -> Result<()> {
        let line = digest.to_json()?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

/// Shared, growable set of journals.
///
/// The laboratory hands clones of this set to the experiments it creates,
/// so journals added later still see every experiment.
#[derive(Clone, Default)]
pub struct Journals {
    inner: Arc<RwLock<Vec<Arc<dyn Journal>>>>,
}

impl Journals {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a journal.
    pub fn add(&self, journal: Arc<dyn Journal>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(journal);
    }

    /// Returns the number of journals.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if there are no journals.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records `digest` in every journal, logging failures.
    ///
    /// A journal that panics counts as failed. Returns the number of
    /// journals that failed.
    pub fn publish(&self, digest: &ReportDigest) -> usize {
        let journals = self.inner.read().unwrap_or_else(PoisonError::into_inner).clone();
        let mut failures = 0;
        for journal in journals {
            match panic::catch_unwind(AssertUnwindSafe(|| journal.record(digest))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Failed to journal experiment '{}': {}", digest.experiment, e);
                    failures += 1;
                }
                Err(payload) => {
                    warn!(
                        "Journal panicked on experiment '{}': {}",
                        digest.experiment,
                        panic_message(payload.as_ref())
                    );
                    failures += 1;
                }
            }
        }
        failures
    }
}

impl std::fmt::Debug for Journals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journals").field("len", &self.len()).finish()
    }
}

/// Journal that always fails. Useful to check that publishing errors stay
/// contained.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingJournal;

impl Journal for FailingJournal {
    fn record(&self, digest: &ReportDigest) -> Result<()> {
        Err(Error::Journal(format!(
            "refusing to record '{}'",
            digest.experiment
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::ValueMatcher;
    use crate::observation::Observation;
    use crate::report::Report;

    fn digest() -> ReportDigest {
        let control: Observation<i32, String> = Observation::capture("add", || Ok(5));
        let trial = Observation::capture("buggy", || Ok(-1));
        Report::new("add", true, control, vec![trial], &ValueMatcher).digest()
    }

    #[test]
    fn memory_journal_collects() {
        let journal = MemoryJournal::new();
        assert!(journal.is_empty());
        journal.record(&digest()).unwrap();
        journal.record(&digest()).unwrap();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal.entries()[0].mismatches, vec!["buggy".to_string()]);
    }

    #[test]
    fn json_lines_journal_writes_one_line_per_report() {
        let journal = JsonLinesJournal::new(Vec::new());
        journal.record(&digest()).unwrap();
        journal.record(&digest()).unwrap();
        let output = String::from_utf8(journal.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: ReportDigest = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.experiment, "add");
    }

    #[test]
    fn tracing_journal_never_fails() {
        assert!(TracingJournal.record(&digest()).is_ok());
    }

    #[test]
    fn publish_counts_failures() {
        let journals = Journals::new();
        let memory = Arc::new(MemoryJournal::new());
        journals.add(Arc::new(FailingJournal));
        journals.add(memory.clone());
        assert_eq!(journals.len(), 2);
        assert_eq!(journals.publish(&digest()), 1);
        assert_eq!(memory.len(), 1);
    }

    struct PanickingJournal;

    impl Journal for PanickingJournal {
        fn record(&self, _digest: &ReportDigest) -> Result<()> {
            panic!("journal sink exploded")
        }
    }

    #[test]
    fn publish_contains_panicking_journal() {
        let journals = Journals::new();
        let memory = Arc::new(MemoryJournal::new());
        journals.add(Arc::new(PanickingJournal));
        journals.add(memory.clone());
        assert_eq!(journals.publish(&digest()), 1);
        assert_eq!(memory.len(), 1);
    }
}
