//! Signature-matched wrapper.
//!
//! [`Plugin::wrap`] synthesizes a component that implements exactly the
//! contracts shared by the target's runtime type and the interceptor's
//! declarations. The synthesized component carries an explicit dispatch
//! table: every operation of those contracts is routed either to the
//! interceptor or straight to the target.
//!
//! ```text
//!   caller ──▶ Plugin ──┬── declared op ──▶ Interceptor::intercept ──▶ (proceed) ──▶ target
//!                       ├── other op ─────────────────────────────────────────────▶ target
//!                       └── base op ──▶ answered by the Plugin itself
//! ```

use crate::component::{Component, ObjectIdentity};
use crate::contract::{ComponentType, Method};
use crate::errors::{PluginError, PluginResult};
use crate::interceptor::{Interceptor, SignatureMap};
use crate::invocation::Invocation;
use crate::types::{OperationSignature, Value};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Intercept,
    Forward,
}

/// A component wrapped by one interceptor.
pub struct Plugin {
    target: Arc<dyn Component>,
    interceptor: Arc<dyn Interceptor>,
    signature_map: SignatureMap,
    routes: HashMap<String, HashMap<OperationSignature, Route>>,
    component_type: Arc<ComponentType>,
    identity: ObjectIdentity,
}

impl Plugin {
    /// Wrap `target` with `interceptor`.
    ///
    /// Returns `target` itself when none of its contracts is declared by the
    /// interceptor. Fails when a declaration does not resolve.
    pub fn wrap(
        target: Arc<dyn Component>,
        interceptor: Arc<dyn Interceptor>,
    ) -> PluginResult<Arc<dyn Component>> {
        let signature_map = SignatureMap::resolve(interceptor.as_ref())?;
        let target_type = target.component_type();

        let contracts: Vec<_> = target_type
            .all_contracts()
            .into_iter()
            .filter(|c| signature_map.has_contract(c.name()))
            .collect();

        if contracts.is_empty() {
            debug!(
                "event=plugin_wrap module=plugin status=elided interceptor={} target={}",
                interceptor.name(),
                target_type.name()
            );
            return Ok(target);
        }

        let mut routes = HashMap::with_capacity(contracts.len());
        for contract in &contracts {
            let table: HashMap<_, _> = contract
                .methods()
                .into_iter()
                .map(|method| {
                    let route = if signature_map.matches(&method) {
                        Route::Intercept
                    } else {
                        Route::Forward
                    };
                    (method.signature().clone(), route)
                })
                .collect();
            routes.insert(contract.name().to_string(), table);
        }

        let name = format!("{}${}", target_type.name(), interceptor.name());
        debug!(
            "event=plugin_wrap module=plugin status=ok interceptor={} target={} contracts={} intercepted={}",
            interceptor.name(),
            target_type.name(),
            contracts.len(),
            signature_map.len()
        );

        Ok(Arc::new(Plugin {
            target,
            interceptor,
            signature_map,
            routes,
            identity: ObjectIdentity::new(name.as_str()),
            component_type: ComponentType::new(name, contracts),
        }))
    }

    /// The wrapped component (possibly itself a wrapper).
    pub fn target(&self) -> &Arc<dyn Component> {
        &self.target
    }

    pub fn interceptor(&self) -> &Arc<dyn Interceptor> {
        &self.interceptor
    }

    pub fn signature_map(&self) -> &SignatureMap {
        &self.signature_map
    }

    fn route(&self, method: &Method) -> Option<Route> {
        self.routes
            .get(method.contract().name())
            .and_then(|table| table.get(method.signature()))
            .copied()
    }
}

impl Component for Plugin {
    fn component_type(&self) -> Arc<ComponentType> {
        Arc::clone(&self.component_type)
    }

    fn invoke(&self, method: &Method, args: &[Value]) -> PluginResult<Value> {
        if let Some(value) = self.identity.try_answer(method, args) {
            return Ok(value);
        }
        match self.route(method) {
            Some(Route::Intercept) => self.interceptor.intercept(Invocation::new(
                Arc::clone(&self.target),
                method.clone(),
                args.to_vec(),
            )),
            Some(Route::Forward) => self.target.invoke(method, args),
            None => Err(PluginError::unsupported(
                self.component_type.name(),
                method.key(),
            )),
        }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("type", &self.component_type.name())
            .field("interceptor", &self.interceptor.name())
            .field("signature_map", &self.signature_map)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ClosureComponent;
    use crate::contract::{Contract, ObjectMethod};
    use crate::errors::ErrorKind;
    use crate::interceptor::Signature;
    use crate::types::NO_PARAMS;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("disk on fire")]
    struct DiskOnFire;

    fn ledger() -> Arc<Contract> {
        Contract::builder("Ledger")
            .operation("balance", NO_PARAMS)
            .operation("deposit", ["Integer"])
            .operation("fail", NO_PARAMS)
            .build()
            .unwrap()
    }

    fn audit() -> Arc<Contract> {
        Contract::builder("Audit")
            .operation("trail", NO_PARAMS)
            .build()
            .unwrap()
    }

    fn account() -> Arc<dyn Component> {
        let ledger = ledger();
        let audit = audit();
        let ty = ComponentType::new("Account", vec![ledger.clone(), audit.clone()]);
        ClosureComponent::builder(ty)
            .on(&ledger.method("balance", NO_PARAMS).unwrap(), |_| Ok(json!(100)))
            .on(&ledger.method("deposit", ["Integer"]).unwrap(), |args| {
                Ok(json!(100 + args[0].as_i64().unwrap_or_default()))
            })
            .on(&ledger.method("fail", NO_PARAMS).unwrap(), |_| {
                Err(PluginError::failure(DiskOnFire))
            })
            .on(&audit.method("trail", NO_PARAMS).unwrap(), |_| Ok(json!([])))
            .build()
            .unwrap()
    }

    /// Doubles whatever `deposit` returns.
    struct Doubler {
        calls: AtomicUsize,
        signatures: Vec<Signature>,
    }

    impl Doubler {
        fn on(signatures: Vec<Signature>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                signatures,
            })
        }
    }

    impl Interceptor for Doubler {
        fn signatures(&self) -> Vec<Signature> {
            self.signatures.clone()
        }

        fn intercept(&self, invocation: Invocation) -> PluginResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let value = invocation.proceed()?;
            Ok(json!(value.as_i64().unwrap_or_default() * 2))
        }
    }

    /// Caps every deposit before forwarding it.
    struct DepositCap(i64);

    impl Interceptor for DepositCap {
        fn signatures(&self) -> Vec<Signature> {
            vec![Signature::new(&ledger(), "deposit", ["Integer"])]
        }

        fn intercept(&self, invocation: Invocation) -> PluginResult<Value> {
            let amount = invocation.args()[0].as_i64().unwrap_or_default();
            invocation.proceed_with(&[json!(amount.min(self.0))])
        }
    }

    #[test]
    fn test_interceptor_rewrites_arguments() {
        let ledger = ledger();
        let wrapped = Plugin::wrap(account(), Arc::new(DepositCap(10))).unwrap();

        let capped = wrapped
            .call(&ledger, "deposit", &["Integer"], &[json!(500)])
            .unwrap();
        assert_eq!(capped, json!(110));

        let small = wrapped
            .call(&ledger, "deposit", &["Integer"], &[json!(3)])
            .unwrap();
        assert_eq!(small, json!(103));
    }

    #[test]
    fn test_declared_operation_is_intercepted() {
        let ledger = ledger();
        let doubler = Doubler::on(vec![Signature::new(&ledger, "deposit", ["Integer"])]);
        let wrapped = Plugin::wrap(account(), doubler.clone()).unwrap();

        let result = wrapped
            .call(&ledger, "deposit", &["Integer"], &[json!(5)])
            .unwrap();
        assert_eq!(result, json!(210));
        assert_eq!(doubler.calls.load(Ordering::SeqCst), 1);

        // Undeclared operation of the same contract goes straight through
        let balance = wrapped.call(&ledger, "balance", &[], &[]).unwrap();
        assert_eq!(balance, json!(100));
        assert_eq!(doubler.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_proxy_implements_only_declared_contracts() {
        let ledger = ledger();
        let doubler = Doubler::on(vec![Signature::new(&ledger, "deposit", ["Integer"])]);
        let wrapped = Plugin::wrap(account(), doubler).unwrap();

        assert!(wrapped.implements("Ledger"));
        assert!(!wrapped.implements("Audit"));
        let err = wrapped.call(&audit(), "trail", &[], &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn test_no_shared_contract_returns_target() {
        let other = Contract::builder("Other")
            .operation("noop", NO_PARAMS)
            .build()
            .unwrap();
        let target = account();
        let doubler = Doubler::on(vec![Signature::new(&other, "noop", NO_PARAMS)]);
        let wrapped = Plugin::wrap(target.clone(), doubler).unwrap();
        assert!(Arc::ptr_eq(&wrapped, &target));
    }

    #[test]
    fn test_unresolved_declaration_fails_at_wrap() {
        let ledger = ledger();
        let doubler = Doubler::on(vec![Signature::new(&ledger, "deposit", ["String"])]);
        let err = Plugin::wrap(account(), doubler).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_target_failure_passes_through_unchanged() {
        let ledger = ledger();
        let target = account();
        let direct = target.call(&ledger, "fail", &[], &[]).unwrap_err();

        let doubler = Doubler::on(vec![Signature::new(&ledger, "deposit", ["Integer"])]);
        let wrapped = Plugin::wrap(target, doubler).unwrap();
        let through = wrapped.call(&ledger, "fail", &[], &[]).unwrap_err();

        assert!(through.downcast_ref::<DiskOnFire>().is_some());
        assert_eq!(direct.to_string(), through.to_string());
    }

    #[test]
    fn test_base_operations_answered_by_wrapper() {
        let ledger = ledger();
        let target = account();
        let doubler = Doubler::on(vec![Signature::new(&ledger, "balance", NO_PARAMS)]);
        let wrapped = Plugin::wrap(target.clone(), doubler.clone()).unwrap();

        let wrapper_id = wrapped.identity().unwrap();
        assert_ne!(wrapper_id, target.identity().unwrap());
        let equals = ObjectMethod::Equals.method();
        assert_eq!(wrapped.invoke(&equals, &[wrapper_id]).unwrap(), json!(true));
        assert_eq!(doubler.calls.load(Ordering::SeqCst), 0);
    }
}
