//! Error types for the interception layer.
//!
//! Two families of errors flow through this crate:
//!
//! 1. **Configuration / binding errors**: raised eagerly while the object
//!    graph is assembled (an interceptor declares an operation its contract
//!    does not have, a dispatch binding points at an unknown statement).
//!
//! 2. **Invocation failures**: anything a target, an interceptor or the
//!    execution service fails with. These travel as a [`Failure`], which
//!    shares the original error behind an `Arc` so every layer hands the
//!    caller the very same error value it received.

use crate::types::MethodKey;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Machine-readable classification of a [`PluginError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Declarations do not resolve against their contract
    Configuration,

    /// A dispatch binding could not be built
    Binding,

    /// The component does not implement the called operation
    UnsupportedOperation,

    /// Failure raised by a target, interceptor or execution service
    Invocation,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Configuration => "CONFIGURATION",
            Self::Binding => "BINDING",
            Self::UnsupportedOperation => "UNSUPPORTED_OPERATION",
            Self::Invocation => "INVOCATION",
        };
        write!(f, "{}", s)
    }
}

/// An invocation failure carried through the chain with its identity intact.
///
/// Cloning a `Failure` clones the `Arc`, never the error, so
/// [`Failure::ptr_eq`] holds between what a target raised and what the
/// outermost caller observes.
#[derive(Clone)]
pub struct Failure(Arc<dyn StdError + Send + Sync + 'static>);

impl Failure {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// Borrow the original error as its concrete type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// True when both failures share the same underlying error value.
    pub fn ptr_eq(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.0, f)
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

/// Error type for every operation of the interception layer.
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    /// Interceptor declarations or settings are invalid.
    #[error("configuration error in {origin}: {message}")]
    Configuration { origin: String, message: String },

    /// A dispatch binding could not be resolved.
    #[error("binding error for {key}: {message}")]
    Binding { key: String, message: String },

    /// The component does not implement the called operation.
    #[error("{component} does not implement {method}")]
    UnsupportedOperation { component: String, method: MethodKey },

    /// Failure raised while a call was being served; displayed verbatim.
    #[error(transparent)]
    Invocation(Failure),
}

impl PluginError {
    /// Create a configuration error
    pub fn configuration(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Create a binding error
    pub fn binding(key: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::Binding {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(component: impl Into<String>, method: MethodKey) -> Self {
        Self::UnsupportedOperation {
            component: component.into(),
            method,
        }
    }

    /// Wrap a domain error raised while serving a call
    pub fn failure<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Invocation(Failure::new(error))
    }

    /// Machine-readable kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Binding { .. } => ErrorKind::Binding,
            Self::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            Self::Invocation(_) => ErrorKind::Invocation,
        }
    }

    /// The carried invocation failure, if any
    pub fn as_failure(&self) -> Option<&Failure> {
        match self {
            Self::Invocation(failure) => Some(failure),
            _ => None,
        }
    }

    /// Borrow the original domain error as its concrete type
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.as_failure().and_then(|f| f.downcast_ref::<E>())
    }
}

impl From<Failure> for PluginError {
    fn from(failure: Failure) -> Self {
        Self::Invocation(failure)
    }
}

/// Result type alias for interception-layer operations
pub type PluginResult<T> = Result<T, PluginError>;
