//! Interceptor chain.
//!
//! Interceptors are applied in registration order, so the last-registered
//! interceptor ends up outermost and sees each call first:
//!
//! ```text
//!   register(A); register(B); register(C)
//!
//!   apply_all(T) = wrap(wrap(wrap(T, A), B), C)
//!
//!   call ──▶ C ──▶ B ──▶ A ──▶ T
//! ```

use crate::component::Component;
use crate::errors::PluginResult;
use crate::interceptor::Interceptor;
use crate::plugin::Plugin;
use log::debug;
use std::sync::Arc;

/// Ordered, append-only registry of interceptors.
///
/// The chain is assembled at configuration time; once shared it is only
/// read, so it needs no synchronization of its own.
#[derive(Default, Clone)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor.
    pub fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        debug!(
            "event=interceptor_register module=chain position={} interceptor={}",
            self.interceptors.len(),
            interceptor.name()
        );
        self.interceptors.push(interceptor);
    }

    /// Wrap `target` once per registered interceptor, in registration order.
    ///
    /// A configuration error from any interceptor aborts the whole
    /// application and is returned as is.
    pub fn plugin_all(&self, target: Arc<dyn Component>) -> PluginResult<Arc<dyn Component>> {
        self.interceptors
            .iter()
            .try_fold(target, |current, interceptor| {
                Plugin::wrap(current, Arc::clone(interceptor))
            })
    }

    /// Registered interceptors, in registration order.
    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.interceptors.iter().map(|i| i.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ClosureComponent;
    use crate::contract::{ComponentType, Contract};
    use crate::errors::PluginResult;
    use crate::interceptor::Signature;
    use crate::invocation::Invocation;
    use crate::types::{Value, NO_PARAMS};
    use serde_json::json;
    use std::sync::Mutex;

    struct Tracer {
        label: &'static str,
        contract: Arc<Contract>,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Interceptor for Tracer {
        fn name(&self) -> &str {
            self.label
        }

        fn signatures(&self) -> Vec<Signature> {
            vec![Signature::new(&self.contract, "run", NO_PARAMS)]
        }

        fn intercept(&self, invocation: Invocation) -> PluginResult<Value> {
            self.log.lock().unwrap().push(self.label);
            invocation.proceed()
        }
    }

    fn job() -> Arc<Contract> {
        Contract::builder("Job")
            .operation("run", NO_PARAMS)
            .build()
            .unwrap()
    }

    #[test]
    fn test_execution_order_is_reverse_of_registration() {
        let contract = job();
        let log = Arc::new(Mutex::new(Vec::new()));
        let target = ClosureComponent::builder(ComponentType::new("Job", vec![contract.clone()]))
            .on(&contract.method("run", NO_PARAMS).unwrap(), |_| Ok(json!("done")))
            .build()
            .unwrap();

        let mut chain = InterceptorChain::new();
        for label in ["first", "second", "third"] {
            chain.add_interceptor(Arc::new(Tracer {
                label,
                contract: contract.clone(),
                log: log.clone(),
            }));
        }

        let wrapped = chain.plugin_all(target).unwrap();
        let result = wrapped.call(&contract, "run", &[], &[]).unwrap();

        assert_eq!(result, json!("done"));
        assert_eq!(*log.lock().unwrap(), vec!["third", "second", "first"]);
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let contract = job();
        let target: Arc<dyn Component> =
            ClosureComponent::builder(ComponentType::new("Job", vec![contract]))
                .build()
                .unwrap();
        let chain = InterceptorChain::new();
        assert!(chain.is_empty());
        let wrapped = chain.plugin_all(target.clone()).unwrap();
        assert!(Arc::ptr_eq(&wrapped, &target));
    }

    #[test]
    fn test_interceptors_listed_in_order() {
        let contract = job();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = InterceptorChain::new();
        for label in ["a", "b"] {
            chain.add_interceptor(Arc::new(Tracer {
                label,
                contract: contract.clone(),
                log: log.clone(),
            }));
        }
        let names: Vec<_> = chain.interceptors().iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(chain.len(), 2);
    }
}
