//! # Agentic Plugins v0.2.0
//!
//! Runtime interception layer for the AgenticOS ecosystem.
//!
//! Extension code wraps calls made against stable, named contracts without
//! the wrapped component knowing about it. The crate provides:
//!
//! - **Interceptor trait**: declares the (contract, operation) pairs it wants
//!   and runs around matching calls through an [`Invocation`]
//! - **Plugin**: the signature-matched wrapper; routes declared calls to the
//!   interceptor and everything else straight to the target
//! - **InterceptorChain**: ordered registry; the last interceptor added sees
//!   a call first
//! - **DispatchProxy**: synthesizes an implementation of a contract that runs
//!   statements through a [`Session`], with one lazily built binding per
//!   operation
//! - **WeakCache**: cache decorator that holds values weakly and keeps a
//!   bounded ring of recently read values alive
//! - **Configuration**: assembles all of the above before requests run
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! agentic-plugins = "0.2"
//! ```
//!
//! ```rust,ignore
//! use agentic_plugins::prelude::*;
//!
//! struct SlowQueryLog;
//!
//! impl Interceptor for SlowQueryLog {
//!     fn signatures(&self) -> Vec<Signature> {
//!         vec![Signature::new(&points::executor(), "update", ["MappedStatement", "Object"])]
//!     }
//!
//!     fn intercept(&self, invocation: Invocation) -> PluginResult<Value> {
//!         invocation.proceed()
//!     }
//! }
//!
//! let mut configuration = Configuration::new();
//! configuration.add_interceptor(SlowQueryLog, &Properties::new())?;
//! let executor = configuration.new_executor(raw_executor)?;
//! ```

pub mod binding;
pub mod cache;
pub mod chain;
pub mod component;
pub mod config;
pub mod contract;
pub mod errors;
pub mod interceptor;
pub mod invocation;
pub mod plugin;
pub mod points;
pub mod types;
pub mod weak_cache;

// Re-export everything in prelude for convenience
pub mod prelude {
    pub use crate::binding::*;
    pub use crate::cache::*;
    pub use crate::chain::*;
    pub use crate::component::*;
    pub use crate::config::*;
    pub use crate::contract::*;
    pub use crate::errors::*;
    pub use crate::interceptor::*;
    pub use crate::invocation::*;
    pub use crate::plugin::*;
    pub use crate::points;
    pub use crate::types::*;
    pub use crate::weak_cache::*;
}

pub use prelude::*;
