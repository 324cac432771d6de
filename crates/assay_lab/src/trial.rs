//! Callable behaviors and named trials.

use std::fmt;
use std::sync::Arc;

/// Shared callable run by a control or trial.
pub type Callback<A, T, E> = Arc<dyn Fn(&A) -> Result<T, E> + Send + Sync>;

/// A callback plus the arguments it was bound to, if any.
///
/// Bound arguments take precedence over the arguments passed to
/// `run`/`report`. An invocation context (receiver) is captured with
/// [`Behavior::with_context`].
pub struct Behavior<A, T, E> {
    callback: Callback<A, T, E>,
    arguments: Option<Arc<A>>,
}

impl<A, T, E> Behavior<A, T, E>
where
    A: 'static,
    T: 'static,
    E: 'static,
{
    /// Wraps a callback taking the run-time arguments.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&A) -> Result<T, E> + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
            arguments: None,
        }
    }

    /// Wraps a callback that is invoked on `context`.
    pub fn with_context<C, F>(context: C, callback: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(&C, &A) -> Result<T, E> + Send + Sync + 'static,
    {
        Self::new(move |args: &A| callback(&context, args))
    }

    /// Wraps an existing shared callback.
    pub fn from_callback(callback: Callback<A, T, E>) -> Self {
        Self {
            callback,
            arguments: None,
        }
    }
}

impl<A, T, E> Behavior<A, T, E> {
    /// Binds construction-time arguments used instead of run-time ones.
    #[must_use]
    pub fn bind(mut self, arguments: A) -> Self {
        self.arguments = Some(Arc::new(arguments));
        self
    }

    /// Returns the callback.
    pub const fn callback(&self) -> &Callback<A, T, E> {
        &self.callback
    }

    /// Returns the bound arguments, if any.
    pub fn arguments(&self) -> Option<&A> {
        self.arguments.as_deref()
    }

    /// Invokes the callback with the bound arguments, or `params` if none.
    pub fn invoke(&self, params: &A) -> Result<T, E> {
        let args = self.arguments.as_deref().unwrap_or(params);
        (self.callback)(args)
    }
}

impl<A, T, E> Clone for Behavior<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
            arguments: self.arguments.clone(),
        }
    }
}

impl<A, T, E> fmt::Debug for Behavior<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Behavior")
            .field("bound_arguments", &self.arguments.is_some())
            .finish_non_exhaustive()
    }
}

/// A named candidate behavior.
pub struct Trial<A, T, E> {
    name: String,
    behavior: Behavior<A, T, E>,
}

impl<A, T, E> Trial<A, T, E> {
    /// Creates a trial from a name and a behavior.
    pub fn new(name: impl Into<String>, behavior: Behavior<A, T, E>) -> Self {
        Self {
            name: name.into(),
            behavior,
        }
    }

    /// Returns the trial name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the behavior.
    pub const fn behavior(&self) -> &Behavior<A, T, E> {
        &self.behavior
    }

    /// Returns the callback.
    pub const fn callback(&self) -> &Callback<A, T, E> {
        self.behavior.callback()
    }

    /// Returns the bound arguments, if any.
    pub fn arguments(&self) -> Option<&A> {
        self.behavior.arguments()
    }

    /// Invokes the trial. See [`Behavior::invoke`].
    pub fn invoke(&self, params: &A) -> Result<T, E> {
        self.behavior.invoke(params)
    }
}

impl<A, T, E> Clone for Trial<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            behavior: self.behavior.clone(),
        }
    }
}

impl<A, T, E> fmt::Debug for Trial<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trial")
            .field("name", &self.name)
            .field("behavior", &self.behavior)
            .finish()
    }
}
