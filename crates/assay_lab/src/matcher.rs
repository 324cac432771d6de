//! Equivalence rules between a trial outcome and the control outcome.

use crate::observation::{Failure, Observation};

/// Decides whether a trial observation is equivalent to the control's.
pub trait Matcher<T, E>: Send + Sync {
    /// Returns true when `trial` matches `control`.
    fn matches(&self, control: &Observation<T, E>, trial: &Observation<T, E>) -> bool;
}

impl<T, E, F> Matcher<T, E> for F
where
    F: Fn(&Observation<T, E>, &Observation<T, E>) -> bool + Send + Sync,
{
    fn matches(&self, control: &Observation<T, E>, trial: &Observation<T, E>) -> bool {
        self(control, trial)
    }
}

/// Default matcher: both sides returned a value and the values are equal.
///
/// Any failure on either side is a mismatch, even if both failed the
/// same way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueMatcher;

impl<T: PartialEq, E> Matcher<T, E> for ValueMatcher {
    fn matches(&self, control: &Observation<T, E>, trial: &Observation<T, E>) -> bool {
        match (control.value(), trial.value()) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => false,
        }
    }
}

/// Matcher comparing full outcomes.
///
/// Equal values match, equal raised errors match, and panics match when
/// their messages are identical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeMatcher;

impl<T: PartialEq, E: PartialEq> Matcher<T, E> for OutcomeMatcher {
    fn matches(&self, control: &Observation<T, E>, trial: &Observation<T, E>) -> bool {
        match (control.outcome(), trial.outcome()) {
            (Ok(expected), Ok(actual)) => expected == actual,
            (Err(Failure::Raised(expected)), Err(Failure::Raised(actual))) => expected == actual,
            (Err(Failure::Panicked(expected)), Err(Failure::Panicked(actual))) => {
                expected == actual
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn obs(name: &str, outcome: Result<i32, Failure<String>>) -> Observation<i32, String> {
        Observation::new(name, outcome, Utc::now(), Duration::ZERO)
    }

    #[test]
    fn value_matcher_equal_values() {
        let control = obs("control", Ok(5));
        assert!(ValueMatcher.matches(&control, &obs("same", Ok(5))));
        assert!(!ValueMatcher.matches(&control, &obs("other", Ok(6))));
    }

    #[test]
    fn value_matcher_any_failure_mismatches() {
        let raised = obs("raised", Err(Failure::Raised("e".to_string())));
        assert!(!ValueMatcher.matches(&obs("control", Ok(5)), &raised));
        assert!(!ValueMatcher.matches(&raised, &obs("trial", Ok(5))));
        assert!(!ValueMatcher.matches(&raised, &raised.clone()));
    }

    #[test]
    fn outcome_matcher_compares_errors() {
        let raised = obs("a", Err(Failure::Raised("e".to_string())));
        let other = obs("b", Err(Failure::Raised("f".to_string())));
        let panicked = obs("c", Err(Failure::Panicked("e".to_string())));
        assert!(OutcomeMatcher.matches(&raised, &raised.clone()));
        assert!(!OutcomeMatcher.matches(&raised, &other));
        assert!(!OutcomeMatcher.matches(&raised, &panicked));
        assert!(OutcomeMatcher.matches(&obs("x", Ok(1)), &obs("y", Ok(1))));
    }

    #[test]
    fn closure_matcher_with_tolerance() {
        let within_one = |c: &Observation<i32, String>, t: &Observation<i32, String>| {
            matches!((c.value(), t.value()), (Some(a), Some(b)) if (a - b).abs() <= 1)
        };
        assert!(within_one.matches(&obs("c", Ok(10)), &obs("t", Ok(11))));
        assert!(!within_one.matches(&obs("c", Ok(10)), &obs("t", Ok(12))));
    }
}
