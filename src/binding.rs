//! Contract dispatch proxies.
//!
//! A [`DispatchProxy`] stands in for an implementation of a mapping contract
//! that nobody wrote by hand. Each call is routed one of three ways:
//!
//! - base-contract calls are answered by the proxy itself;
//! - operations with a default body run that body, with the proxy as receiver;
//! - everything else goes through a [`DispatchBinding`] to the [`Session`].
//!
//! Bindings are pure to build, so they are memoized in a [`BindingCache`]
//! shared by every proxy of the same contract. Concurrent first calls may
//! each build one; the first to publish wins and the others are dropped.

use crate::component::{Component, ObjectIdentity};
use crate::contract::{ComponentType, Contract, Method};
use crate::errors::{PluginError, PluginResult};
use crate::types::{MethodKey, Value};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// What an executed statement does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Flush,
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Select => write!(f, "select"),
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Flush => write!(f, "flush"),
        }
    }
}

/// Statements known to the execution service, keyed by
/// `"<contract>.<operation>"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatementCatalog {
    #[serde(default)]
    statements: HashMap<String, StatementKind>,
}

impl StatementCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a statement
    pub fn statement(mut self, id: impl Into<String>, kind: StatementKind) -> Self {
        self.add(id, kind);
        self
    }

    pub fn add(&mut self, id: impl Into<String>, kind: StatementKind) {
        self.statements.insert(id.into(), kind);
    }

    pub fn get(&self, id: &str) -> Option<StatementKind> {
        self.statements.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.statements.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// The execution service a dispatch proxy is bound to.
///
/// Opaque to this crate beyond its shape: it receives the binding and the
/// call arguments and returns a result or a failure.
pub trait Session: Send + Sync {
    /// Statements this session can execute.
    fn statements(&self) -> &StatementCatalog;

    /// Execute a bound operation.
    fn execute(&self, binding: &DispatchBinding, args: &[Value]) -> PluginResult<Value>;
}

/// Memoized association of one contract operation to its statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchBinding {
    key: MethodKey,
    statement_id: String,
    kind: StatementKind,
}

impl DispatchBinding {
    /// Resolve the statement for `method` in `statements`.
    pub fn new(method: &Method, statements: &StatementCatalog) -> PluginResult<Self> {
        let key = method.key();
        let statement_id = format!("{}.{}", key.contract, key.signature.name);
        match statements.get(&statement_id) {
            Some(kind) => Ok(Self {
                key,
                statement_id,
                kind,
            }),
            None => Err(PluginError::binding(
                &key,
                format!("invalid bound statement (not found): {}", statement_id),
            )),
        }
    }

    pub fn key(&self) -> &MethodKey {
        &self.key
    }

    pub fn statement_id(&self) -> &str {
        &self.statement_id
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Hand the call to the execution service.
    pub fn execute(&self, session: &dyn Session, args: &[Value]) -> PluginResult<Value> {
        session.execute(self, args)
    }
}

/// Shared memo of dispatch bindings.
#[derive(Debug, Clone, Default)]
pub struct BindingCache {
    bindings: Arc<RwLock<HashMap<MethodKey, Arc<DispatchBinding>>>>,
}

impl BindingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the binding for `key`, building it with `build` if absent.
    ///
    /// `build` runs outside the lock and may run on several threads at once;
    /// whichever result is published first is the one every caller gets.
    pub fn get_or_build<F>(&self, key: &MethodKey, build: F) -> PluginResult<Arc<DispatchBinding>>
    where
        F: FnOnce() -> PluginResult<DispatchBinding>,
    {
        if let Some(binding) = self.get(key) {
            return Ok(binding);
        }

        let built = Arc::new(build()?);
        let mut bindings = self.bindings.write().unwrap_or_else(PoisonError::into_inner);
        let binding = bindings
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(
                    "event=binding_create module=binding statement={} kind={}",
                    built.statement_id(),
                    built.kind()
                );
                Arc::clone(&built)
            })
            .clone();
        Ok(binding)
    }

    pub fn get(&self, key: &MethodKey) -> Option<Arc<DispatchBinding>> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ═══════════════════════════════════════════════════════════════════
// DISPATCH PROXY
// ═══════════════════════════════════════════════════════════════════

/// Synthesized implementation of one contract bound to a session.
pub struct DispatchProxy {
    session: Arc<dyn Session>,
    contract: Arc<Contract>,
    cache: BindingCache,
    component_type: Arc<ComponentType>,
    identity: ObjectIdentity,
}

impl DispatchProxy {
    pub fn new(session: Arc<dyn Session>, contract: Arc<Contract>, cache: BindingCache) -> Self {
        let name = format!("DispatchProxy<{}>", contract.name());
        Self {
            session,
            identity: ObjectIdentity::new(name.as_str()),
            component_type: ComponentType::new(name, vec![Arc::clone(&contract)]),
            contract,
            cache,
        }
    }

    pub fn contract(&self) -> &Arc<Contract> {
        &self.contract
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    fn binding(&self, method: &Method) -> PluginResult<Arc<DispatchBinding>> {
        self.cache.get_or_build(&method.key(), || {
            DispatchBinding::new(method, self.session.statements())
        })
    }
}

impl Component for DispatchProxy {
    fn component_type(&self) -> Arc<ComponentType> {
        Arc::clone(&self.component_type)
    }

    fn invoke(&self, method: &Method, args: &[Value]) -> PluginResult<Value> {
        if let Some(value) = self.identity.try_answer(method, args) {
            return Ok(value);
        }
        if method.contract().name() != self.contract.name() {
            return Err(PluginError::unsupported(
                self.component_type.name(),
                method.key(),
            ));
        }
        if let Some(body) = method.default_body() {
            return body(self, args);
        }
        let binding = self.binding(method)?;
        binding.execute(self.session.as_ref(), args)
    }
}

impl std::fmt::Debug for DispatchProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchProxy")
            .field("contract", &self.contract.name())
            .field("identity", &self.identity.id())
            .field("bindings", &self.cache.len())
            .finish()
    }
}

/// Creates dispatch proxies for one contract, all sharing one binding cache.
#[derive(Debug, Clone)]
pub struct DispatchProxyFactory {
    contract: Arc<Contract>,
    cache: BindingCache,
}

impl DispatchProxyFactory {
    pub fn new(contract: Arc<Contract>) -> Self {
        Self {
            contract,
            cache: BindingCache::new(),
        }
    }

    pub fn contract(&self) -> &Arc<Contract> {
        &self.contract
    }

    pub fn binding_cache(&self) -> &BindingCache {
        &self.cache
    }

    pub fn new_instance(&self, session: Arc<dyn Session>) -> Arc<DispatchProxy> {
        Arc::new(DispatchProxy::new(
            session,
            Arc::clone(&self.contract),
            self.cache.clone(),
        ))
    }
}

/// Known mapping contracts and their proxy factories.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    factories: HashMap<String, DispatchProxyFactory>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a contract. Registering the same name twice is an error.
    pub fn add_contract(&mut self, contract: Arc<Contract>) -> PluginResult<()> {
        let name = contract.name().to_string();
        if self.factories.contains_key(&name) {
            return Err(PluginError::binding(
                &name,
                "contract is already known to the registry",
            ));
        }
        self.factories
            .insert(name, DispatchProxyFactory::new(contract));
        Ok(())
    }

    pub fn has_contract(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn factory(&self, name: &str) -> Option<&DispatchProxyFactory> {
        self.factories.get(name)
    }

    /// Create a proxy for `name` bound to `session`.
    pub fn proxy(&self, name: &str, session: Arc<dyn Session>) -> PluginResult<Arc<DispatchProxy>> {
        self.factories
            .get(name)
            .map(|factory| factory.new_instance(session))
            .ok_or_else(|| PluginError::binding(name, "contract is not known to the registry"))
    }

    /// Registered contract names, sorted.
    pub fn contracts(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}
