//! The callable surface every wrapped object exposes.

use crate::contract::{ComponentType, Contract, Method, ObjectMethod};
use crate::errors::{PluginError, PluginResult};
use crate::types::{MethodKey, UniqueId, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// An object that implements one or more contracts.
///
/// Targets, synthesized wrappers and dispatch proxies all implement this
/// trait, which is what lets wrappers stack over each other without the
/// caller noticing.
pub trait Component: Send + Sync {
    /// Runtime type, including the implemented contracts.
    fn component_type(&self) -> Arc<ComponentType>;

    /// Execute one operation.
    fn invoke(&self, method: &Method, args: &[Value]) -> PluginResult<Value>;

    // ═══════════════════════════════════════════════════════
    // DEFAULT IMPLEMENTATIONS
    // ═══════════════════════════════════════════════════════

    /// Resolve `name(params)` on `contract` and invoke it.
    fn call(
        &self,
        contract: &Arc<Contract>,
        name: &str,
        params: &[&str],
        args: &[Value],
    ) -> PluginResult<Value> {
        let method = contract.method(name, params.iter().copied())?;
        self.invoke(&method, args)
    }

    /// Whether the runtime type implements `contract`.
    fn implements(&self, contract: &str) -> bool {
        self.component_type().implements(contract)
    }

    /// The universal `identity()` of this component.
    fn identity(&self) -> PluginResult<Value> {
        self.invoke(&ObjectMethod::Identity.method(), &[])
    }
}

/// Local behaviour of the universal base contract.
///
/// Every component that answers base calls itself (instead of forwarding
/// them) keeps one of these.
#[derive(Debug, Clone)]
pub struct ObjectIdentity {
    id: UniqueId,
    description: String,
}

impl ObjectIdentity {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: UniqueId::new(),
            description: description.into(),
        }
    }

    pub fn id(&self) -> UniqueId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Answer one base-contract call.
    pub fn answer(&self, method: ObjectMethod, args: &[Value]) -> Value {
        match method {
            ObjectMethod::Identity => Value::String(self.id.to_string()),
            ObjectMethod::Equals => {
                let other = args.first().and_then(Value::as_str);
                Value::Bool(other == Some(self.id.to_string().as_str()))
            }
            ObjectMethod::ToString => Value::String(format!("{}@{}", self.description, self.id)),
        }
    }

    /// Answer `method` if it belongs to the base contract.
    pub fn try_answer(&self, method: &Method, args: &[Value]) -> Option<Value> {
        ObjectMethod::of(method).map(|m| self.answer(m, args))
    }
}

/// Handler for one operation of a [`ClosureComponent`].
pub type Handler = Arc<dyn Fn(&[Value]) -> PluginResult<Value> + Send + Sync>;

/// A component defined by an explicit dispatch table of closures.
///
/// Operations without a handler fall back to the contract's default body,
/// executed with this component as the receiver.
pub struct ClosureComponent {
    component_type: Arc<ComponentType>,
    identity: ObjectIdentity,
    handlers: HashMap<MethodKey, Handler>,
}

impl ClosureComponent {
    pub fn builder(component_type: Arc<ComponentType>) -> ClosureComponentBuilder {
        ClosureComponentBuilder {
            component_type,
            handlers: Vec::new(),
        }
    }

    pub fn object_identity(&self) -> &ObjectIdentity {
        &self.identity
    }

    pub fn handles(&self, key: &MethodKey) -> bool {
        self.handlers.contains_key(key)
    }
}

impl Component for ClosureComponent {
    fn component_type(&self) -> Arc<ComponentType> {
        Arc::clone(&self.component_type)
    }

    fn invoke(&self, method: &Method, args: &[Value]) -> PluginResult<Value> {
        if let Some(value) = self.identity.try_answer(method, args) {
            return Ok(value);
        }
        let key = method.key();
        if let Some(handler) = self.handlers.get(&key) {
            return handler(args);
        }
        match method.default_body() {
            Some(body) if self.component_type.implements(method.contract().name()) => {
                body(self, args)
            }
            _ => Err(PluginError::unsupported(self.component_type.name(), key)),
        }
    }
}

impl std::fmt::Debug for ClosureComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.handlers.keys().map(|k| k.to_string()).collect();
        keys.sort();
        f.debug_struct("ClosureComponent")
            .field("type", &self.component_type.name())
            .field("identity", &self.identity.id())
            .field("handlers", &keys)
            .finish()
    }
}

/// Builder for [`ClosureComponent`].
pub struct ClosureComponentBuilder {
    component_type: Arc<ComponentType>,
    handlers: Vec<(Method, Handler)>,
}

impl ClosureComponentBuilder {
    /// Register the handler for `method`.
    pub fn on<F>(mut self, method: &Method, handler: F) -> Self
    where
        F: Fn(&[Value]) -> PluginResult<Value> + Send + Sync + 'static,
    {
        self.handlers.push((method.clone(), Arc::new(handler)));
        self
    }

    /// Build the component. Every handler must belong to a contract the
    /// component type implements, and may be registered only once.
    pub fn build(self) -> PluginResult<Arc<ClosureComponent>> {
        let mut handlers = HashMap::with_capacity(self.handlers.len());
        for (method, handler) in self.handlers {
            if method.is_object_method() {
                return Err(PluginError::configuration(
                    self.component_type.name(),
                    format!("{} is answered by the component identity", method),
                ));
            }
            if !self.component_type.implements(method.contract().name()) {
                return Err(PluginError::configuration(
                    self.component_type.name(),
                    format!("{} does not implement {}", self.component_type.name(), method.contract().name()),
                ));
            }
            if handlers.insert(method.key(), handler).is_some() {
                return Err(PluginError::configuration(
                    self.component_type.name(),
                    format!("handler for {} registered twice", method),
                ));
            }
        }
        let identity = ObjectIdentity::new(self.component_type.name());
        Ok(Arc::new(ClosureComponent {
            component_type: self.component_type,
            identity,
            handlers,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::types::NO_PARAMS;
    use serde_json::json;

    fn counter_contract() -> Arc<Contract> {
        Contract::builder("Counter")
            .operation("get", NO_PARAMS)
            .operation("add", ["Integer"])
            .default_operation("doubled", NO_PARAMS, |receiver, _| {
                let counter = receiver.component_type().all_contracts()[0].clone();
                let current = receiver.call(&counter, "get", &[], &[])?;
                Ok(json!(current.as_i64().unwrap_or_default() * 2))
            })
            .build()
            .unwrap()
    }

    fn counter() -> Arc<ClosureComponent> {
        let contract = counter_contract();
        let ty = ComponentType::new("FixedCounter", vec![contract.clone()]);
        ClosureComponent::builder(ty)
            .on(&contract.method("get", NO_PARAMS).unwrap(), |_| Ok(json!(21)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_handler_dispatch() {
        let component = counter();
        let contract = counter_contract();
        assert_eq!(component.call(&contract, "get", &[], &[]).unwrap(), json!(21));
    }

    #[test]
    fn test_default_body_runs_against_receiver() {
        let component = counter();
        let contract = counter_contract();
        assert_eq!(component.call(&contract, "doubled", &[], &[]).unwrap(), json!(42));
    }

    #[test]
    fn test_missing_handler_is_unsupported() {
        let component = counter();
        let contract = counter_contract();
        let err = component
            .call(&contract, "add", &["Integer"], &[json!(1)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn test_object_identity() {
        let component = counter();
        let id = component.identity().unwrap();
        let equals = ObjectMethod::Equals.method();
        assert_eq!(component.invoke(&equals, &[id.clone()]).unwrap(), json!(true));
        assert_eq!(component.invoke(&equals, &[json!("other")]).unwrap(), json!(false));
        let text = component
            .invoke(&ObjectMethod::ToString.method(), &[])
            .unwrap();
        assert!(text.as_str().unwrap().starts_with("FixedCounter@"));
    }

    #[test]
    fn test_builder_rejects_foreign_contract() {
        let foreign = Contract::builder("Foreign")
            .operation("run", NO_PARAMS)
            .build()
            .unwrap();
        let ty = ComponentType::new("FixedCounter", vec![counter_contract()]);
        let result = ClosureComponent::builder(ty)
            .on(&foreign.method("run", NO_PARAMS).unwrap(), |_| Ok(Value::Null))
            .build();
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Configuration);
    }
}
