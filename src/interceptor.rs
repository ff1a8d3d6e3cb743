//! Interceptor capability and signature resolution.
//!
//! An interceptor declares, up front, which `(contract, operation)` pairs it
//! wants to see. Declarations are plain data ([`Signature`]) and are resolved
//! against the contract's signature catalog into a [`SignatureMap`] every time
//! the interceptor wraps a target. A declaration that does not resolve is a
//! configuration error, reported before any call is made.

use crate::config::Properties;
use crate::contract::{Contract, Method};
use crate::errors::{PluginError, PluginResult};
use crate::invocation::Invocation;
use crate::types::{MethodKey, OperationSignature, Value};
use log::warn;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// One declared interception target: an operation name and its ordered
/// parameter types on a contract.
#[derive(Debug, Clone)]
pub struct Signature {
    contract: Arc<Contract>,
    method: String,
    args: Vec<String>,
}

impl Signature {
    pub fn new<P, S>(contract: &Arc<Contract>, method: impl Into<String>, args: P) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            contract: Arc::clone(contract),
            method: method.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contract(&self) -> &Arc<Contract> {
        &self.contract
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn operation_signature(&self) -> OperationSignature {
        OperationSignature::new(self.method.as_str(), self.args.iter().cloned())
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}({})",
            self.contract.name(),
            self.method,
            self.args.join(", ")
        )
    }
}

/// A registered capability that intercepts specific contract operations.
///
/// Only calls matching [`Interceptor::signatures`] reach
/// [`Interceptor::intercept`]; the interceptor decides whether and when to
/// forward them through [`Invocation::proceed`].
pub trait Interceptor: Send + Sync {
    /// Name used in logs and configuration errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Operations this interceptor wants to see.
    fn signatures(&self) -> Vec<Signature>;

    /// Handle one matched call.
    fn intercept(&self, invocation: Invocation) -> PluginResult<Value>;

    /// Receive configured properties. Called once, before registration.
    fn set_properties(&mut self, _properties: &Properties) -> PluginResult<()> {
        Ok(())
    }
}

/// Resolved declarations of one interceptor, grouped by contract.
#[derive(Debug, Clone, Default)]
pub struct SignatureMap {
    contracts: BTreeMap<String, Arc<Contract>>,
    operations: BTreeMap<String, BTreeSet<OperationSignature>>,
}

impl SignatureMap {
    /// Resolve every declaration of `interceptor`.
    ///
    /// Fails with a configuration error naming the first declaration that
    /// does not match exactly one operation of its contract, or when the
    /// interceptor declares nothing at all.
    pub fn resolve(interceptor: &dyn Interceptor) -> PluginResult<Self> {
        let signatures = interceptor.signatures();
        if signatures.is_empty() {
            warn!(
                "event=signature_resolve module=interceptor status=error interceptor={} error_code=no_signatures",
                interceptor.name()
            );
            return Err(PluginError::configuration(
                interceptor.name(),
                "no interception signatures declared",
            ));
        }

        let mut map = SignatureMap::default();
        for sig in signatures {
            let signature = sig.operation_signature();
            if !sig.contract.contains(&signature) {
                warn!(
                    "event=signature_resolve module=interceptor status=error interceptor={} signature={}",
                    interceptor.name(),
                    sig
                );
                return Err(PluginError::configuration(
                    interceptor.name(),
                    format!(
                        "could not find operation on {} named {} with parameters ({})",
                        sig.contract.name(),
                        sig.method,
                        sig.args.join(", ")
                    ),
                ));
            }
            let name = sig.contract.name().to_string();
            map.contracts
                .entry(name.clone())
                .or_insert_with(|| Arc::clone(&sig.contract));
            map.operations.entry(name).or_default().insert(signature);
        }
        Ok(map)
    }

    /// Whether the interceptor declared any operation of `contract`.
    pub fn has_contract(&self, contract: &str) -> bool {
        self.contracts.contains_key(contract)
    }

    /// Whether the exact operation is intercepted.
    pub fn contains(&self, key: &MethodKey) -> bool {
        self.operations
            .get(&key.contract)
            .is_some_and(|ops| ops.contains(&key.signature))
    }

    pub fn matches(&self, method: &Method) -> bool {
        self.operations
            .get(method.contract().name())
            .is_some_and(|ops| ops.contains(method.signature()))
    }

    /// Declared contracts, by name.
    pub fn contracts(&self) -> impl Iterator<Item = &Arc<Contract>> {
        self.contracts.values()
    }

    /// Number of resolved operations across all contracts.
    pub fn len(&self) -> usize {
        self.operations.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
