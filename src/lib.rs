//! Settle-once deferred values.
//!
//! A deferred value is created around an executor that is run immediately
//! and handed two completion handles. The first handle called settles the
//! value for good; every later call is ignored. Observers registered before
//! settlement are queued and fired in registration order, observers
//! registered after settlement fire on the spot.
//!
//! Two flavors are provided:
//!
//! - [`local::Deferred`] for a single thread of control (`Rc` based).
//! - [`sync::SyncDeferred`] for values settled from other threads (`Arc` and
//!   `Mutex` based), which can also be awaited through [`wait::Settled`].
//!
//! # Examples
//!
//! ```
//! use deferred::{Deferred, Status};
//!
//! let d = Deferred::<&str, &str>::new(|resolve, reject| {
//!     resolve.resolve("resolve data");
//!     reject.reject("reject reason");
//!     Ok(())
//! });
//! assert_eq!(d.status(), Status::Succeeded);
//! d.observe(|value| assert_eq!(*value, "resolve data"), |_| unreachable!());
//! ```
use std::any::Any;
use std::fmt;

pub mod local;
pub mod sync;
pub mod wait;

pub use local::{Deferred, Reject, Resolve};
pub use sync::SyncDeferred;
pub use wait::Settled;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("executor panicked: {0}")]
    ExecutorPanicked(String),
}

impl Error {
    /// Turns a `catch_unwind` payload into an [`Error::ExecutorPanicked`].
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_owned(),
                Err(_) => "unknown panic payload".to_owned(),
            },
        };
        Error::ExecutorPanicked(message)
    }
}

/// Where a deferred value is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Unsettled,
    Succeeded,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Unsettled => "unsettled",
            Status::Succeeded => "succeeded",
            Status::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_payloads() {
        let err = Error::from_panic(Box::new(String::from("boom")));
        assert_eq!(err, Error::ExecutorPanicked("boom".into()));
        let err = Error::from_panic(Box::new("static boom"));
        assert_eq!(err, Error::ExecutorPanicked("static boom".into()));
        let err = Error::from_panic(Box::new(7u8));
        assert_eq!(err.to_string(), "executor panicked: unknown panic payload");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::Unsettled.to_string(), "unsettled");
        assert_eq!(Status::Failed.to_string(), "failed");
    }
}
