//! Error taxonomy (see SPEC_FULL.md §7).

use thiserror::Error;

/// Everything that can go wrong while running a processor.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller violated an API contract (e.g. called [`crate::now`]
    /// outside of [`crate::run`]). Never raised by user callback code.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// A user callback panicked or returned an error.
    #[error("callback failed on {site}: {message}")]
    CallbackFailure { site: String, message: String },

    /// A live source (the `future` stream passed to [`crate::process_stream`])
    /// ended with an error instead of simply running dry.
    #[error("source failed on {site}: {message}")]
    SourceFailure { site: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn contract(message: impl Into<String>) -> Self {
        Error::ContractViolation(message.into())
    }

    pub(crate) fn callback_panic(site: impl Into<String>, payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "callback panicked".to_string());
        Error::CallbackFailure { site: site.into(), message }
    }

    /// Re-tag a `CallbackFailure`/`SourceFailure` raised deep inside a stream
    /// body with the label of the stream that owns it, once that label is
    /// known (streams don't know their own registration label at construction
    /// time, only `Processor::register_stream` does).
    pub(crate) fn labeled(self, site: impl Into<String>) -> Self {
        let site = site.into();
        match self {
            Error::CallbackFailure { message, .. } => Error::CallbackFailure { site, message },
            Error::SourceFailure { message, .. } => Error::SourceFailure { site, message },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labeled_rewrites_site_on_callback_failure() {
        let err = Error::CallbackFailure { site: "unknown".into(), message: "boom".into() };
        let relabeled = err.labeled("stream#2");
        match relabeled {
            Error::CallbackFailure { site, message } => {
                assert_eq!(site, "stream#2");
                assert_eq!(message, "boom");
            }
            _ => panic!("expected CallbackFailure"),
        }
    }

    #[test]
    fn labeled_leaves_contract_violation_alone() {
        let err = Error::contract("now() called outside run()");
        let relabeled = err.labeled("stream#0");
        assert!(matches!(relabeled, Error::ContractViolation(_)));
    }
}
