//! Arithmetic subject under simulation.
//!
//! Small, pure operations with checked failure modes make it easy to tell
//! what a correct control or a faulty trial should return.

use assay_lab::{Experiment, Laboratory};
use std::sync::Arc;
use thiserror::Error;

/// Operand pair passed to every arithmetic callback.
pub type Operands = (i64, i64);

/// Experiment over arithmetic callbacks.
pub type Arithmetic = Experiment<Operands, i64, MathError>;

/// Errors raised by arithmetic callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MathError {
    /// Division with a zero divisor.
    #[error("division by zero")]
    DivideByZero,
    /// Result does not fit in an `i64`.
    #[error("arithmetic overflow")]
    Overflow,
    /// Fault injected by the chaos injector.
    #[error("injected fault: {0}")]
    Injected(String),
}

/// Checked addition.
///
/// # Errors
///
/// Returns [`MathError::Overflow`] when the sum does not fit.
pub fn checked_add(&(a, b): &Operands) -> Result<i64, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

/// Checked subtraction.
///
/// # Errors
///
/// Returns [`MathError::Overflow`] when the difference does not fit.
pub fn checked_sub(&(a, b): &Operands) -> Result<i64, MathError> {
    a.checked_sub(b).ok_or(MathError::Overflow)
}

/// Checked division.
///
/// # Errors
///
/// Returns [`MathError::DivideByZero`] for a zero divisor and
/// [`MathError::Overflow`] for `i64::MIN / -1`.
pub fn checked_div(&(a, b): &Operands) -> Result<i64, MathError> {
    if b == 0 {
        return Err(MathError::DivideByZero);
    }
    a.checked_div(b).ok_or(MathError::Overflow)
}

/// Creates a standalone experiment whose control is [`checked_add`].
pub fn addition(name: &str) -> Arithmetic {
    let experiment = Arithmetic::new(name);
    experiment.control(checked_add);
    experiment
}

/// Gets or creates `name` in `lab` with [`checked_add`] as control.
///
/// # Errors
///
/// Returns an error if `name` is registered with another signature.
pub fn registered_addition(lab: &Laboratory, name: &str) -> assay_lab::Result<Arc<Arithmetic>> {
    let experiment = lab.experiment::<Operands, i64, MathError>(name)?;
    experiment.control(checked_add);
    Ok(experiment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_operations() {
        assert_eq!(checked_add(&(2, 3)), Ok(5));
        assert_eq!(checked_add(&(i64::MAX, 1)), Err(MathError::Overflow));
        assert_eq!(checked_sub(&(2, 3)), Ok(-1));
        assert_eq!(checked_div(&(7, 2)), Ok(3));
        assert_eq!(checked_div(&(1, 0)), Err(MathError::DivideByZero));
        assert_eq!(checked_div(&(i64::MIN, -1)), Err(MathError::Overflow));
    }

    #[test]
    fn addition_has_control() {
        let experiment = addition("add");
        assert!(experiment.has_control());
        assert_eq!(experiment.run(&(40, 2)).unwrap(), Ok(42));
    }
}
