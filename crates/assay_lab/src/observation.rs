//! Captured outcome of a single control or trial invocation.

use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// Why a callback did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure<E> {
    /// The callback returned `Err`.
    Raised(E),
    /// The callback panicked. Holds the panic message.
    Panicked(String),
}

impl<E> Failure<E> {
    /// Returns the raised error, if the callback returned one.
    pub const fn raised(&self) -> Option<&E> {
        match self {
            Self::Raised(e) => Some(e),
            Self::Panicked(_) => None,
        }
    }

    /// Returns true if the callback panicked.
    pub const fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }
}

impl<E: fmt::Display> fmt::Display for Failure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raised(e) => write!(f, "{e}"),
            Self::Panicked(message) => write!(f, "panicked: {message}"),
        }
    }
}

/// Immutable record of one callback execution.
///
/// The outcome is a `Result`, so an observation always carries exactly one
/// of a value or a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<T, E> {
    name: String,
    outcome: Result<T, Failure<E>>,
    started_at: DateTime<Utc>,
    duration: Duration,
}

impl<T, E> Observation<T, E> {
    /// Builds an observation from already measured parts.
    pub fn new(
        name: impl Into<String>,
        outcome: Result<T, Failure<E>>,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            outcome,
            started_at,
            duration,
        }
    }

    /// Runs `call` and records its outcome and timing.
    ///
    /// Panics raised by `call` are caught and recorded as
    /// [`Failure::Panicked`]. The process panic hook still runs first, so
    /// the default hook prints the panic to stderr. Install a quieter hook
    /// with [`std::panic::set_hook`] if trial panics should stay silent.
    pub fn capture<F>(name: impl Into<String>, call: F) -> Self
    where
        F: FnOnce() -> Result<T, E>,
    {
        let started_at = Utc::now();
        let start = Instant::now();
        let outcome = match panic::catch_unwind(AssertUnwindSafe(call)) {
            Ok(result) => result.map_err(Failure::Raised),
            Err(payload) => Err(Failure::Panicked(panic_message(payload.as_ref()))),
        };
        let duration = start.elapsed();
        Self::new(name, outcome, started_at, duration)
    }

    /// Runs `call` and records its outcome and timing without catching panics.
    ///
    /// Used for the control on the `run` path, where a panic must unwind to
    /// the caller exactly as a direct call would.
    pub fn capture_unguarded<F>(name: impl Into<String>, call: F) -> Self
    where
        F: FnOnce() -> Result<T, E>,
    {
        let started_at = Utc::now();
        let start = Instant::now();
        let outcome = call().map_err(Failure::Raised);
        let duration = start.elapsed();
        Self::new(name, outcome, started_at, duration)
    }

    /// Returns the name of the observed behavior.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the full outcome.
    pub const fn outcome(&self) -> &Result<T, Failure<E>> {
        &self.outcome
    }

    /// Consumes the observation and returns the outcome.
    pub fn into_outcome(self) -> Result<T, Failure<E>> {
        self.outcome
    }

    /// Returns the value, if the callback returned normally.
    pub fn value(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    /// Returns the failure, if the callback errored or panicked.
    pub fn error(&self) -> Option<&Failure<E>> {
        self.outcome.as_ref().err()
    }

    /// Returns true if the callback returned normally.
    pub const fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Wall-clock time at which the call started.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Elapsed time of the call, measured with a monotonic clock.
    pub const fn duration(&self) -> Duration {
        self.duration
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_value() {
        let obs: Observation<i32, String> = Observation::capture("add", || Ok(2 + 3));
        assert_eq!(obs.name(), "add");
        assert_eq!(obs.value(), Some(&5));
        assert!(obs.error().is_none());
        assert!(obs.is_ok());
    }

    #[test]
    fn capture_error() {
        let obs: Observation<i32, String> = Observation::capture("div", || Err("boom".to_string()));
        assert!(obs.value().is_none());
        assert_eq!(obs.error(), Some(&Failure::Raised("boom".to_string())));
    }

    #[test]
    fn capture_panic() {
        let obs: Observation<i32, String> = Observation::capture("bad", || panic!("kaboom"));
        assert!(obs.value().is_none());
        let failure = obs.error().unwrap();
        assert!(failure.is_panic());
        assert_eq!(failure, &Failure::Panicked("kaboom".to_string()));
    }

    #[test]
    fn capture_formatted_panic() {
        let obs: Observation<i32, String> =
            Observation::capture("bad", || panic!("index {} out of range", 7));
        assert_eq!(
            obs.error(),
            Some(&Failure::Panicked("index 7 out of range".to_string()))
        );
    }

    #[test]
    fn capture_measures_duration() {
        let obs: Observation<(), String> = Observation::capture("sleep", || {
            std::thread::sleep(Duration::from_millis(5));
            Ok(())
        });
        assert!(obs.duration() >= Duration::from_millis(5));
    }

    #[test]
    fn failure_display() {
        let raised: Failure<String> = Failure::Raised("division by zero".to_string());
        assert_eq!(raised.to_string(), "division by zero");
        let panicked: Failure<String> = Failure::Panicked("oops".to_string());
        assert_eq!(panicked.to_string(), "panicked: oops");
    }
}
