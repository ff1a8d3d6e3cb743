//! Invocation record handed to interceptors.

use crate::component::Component;
use crate::contract::Method;
use crate::errors::PluginResult;
use crate::types::Value;
use std::sync::Arc;

/// Immutable capture of one intercepted call: the wrapped target, the
/// operation called and its arguments.
#[derive(Clone)]
pub struct Invocation {
    target: Arc<dyn Component>,
    method: Method,
    args: Vec<Value>,
}

impl Invocation {
    pub fn new(target: Arc<dyn Component>, method: Method, args: Vec<Value>) -> Self {
        Self {
            target,
            method,
            args,
        }
    }

    pub fn target(&self) -> &Arc<dyn Component> {
        &self.target
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Forward the call to the wrapped target and return exactly what it
    /// returns, failures included.
    pub fn proceed(&self) -> PluginResult<Value> {
        self.target.invoke(&self.method, &self.args)
    }

    /// Forward the call with replacement arguments.
    pub fn proceed_with(&self, args: &[Value]) -> PluginResult<Value> {
        self.target.invoke(&self.method, args)
    }
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("target", &self.target.component_type().name())
            .field("method", &self.method)
            .field("args", &self.args)
            .finish()
    }
}
