//! Contracts: named, queryable catalogs of operation signatures.
//!
//! A contract is the unit an interceptor declares against and the unit a
//! component advertises through its [`ComponentType`]. Every contract carries
//! an explicit signature catalog built once, at definition time, so that
//! interceptor declarations can be validated without any runtime type
//! introspection.
//!
//! One contract is built in: [`object_contract`], the universal base contract
//! every component answers (`identity`, `equals`, `to_string`).

use crate::component::Component;
use crate::errors::{PluginError, PluginResult};
use crate::types::{MethodKey, OperationSignature, Value, NO_PARAMS};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Name of the universal base contract.
pub const OBJECT_CONTRACT: &str = "object";

/// Body of an operation implemented by the contract itself.
///
/// The body runs against an external receiver (the component the call was
/// made on), so it may call back into other operations of that receiver.
pub type DefaultBody = Arc<dyn Fn(&dyn Component, &[Value]) -> PluginResult<Value> + Send + Sync>;

/// One operation of a contract.
#[derive(Clone)]
pub struct Operation {
    signature: OperationSignature,
    default_body: Option<DefaultBody>,
}

impl Operation {
    pub fn signature(&self) -> &OperationSignature {
        &self.signature
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }

    /// Whether the contract supplies its own implementation.
    pub fn has_default_body(&self) -> bool {
        self.default_body.is_some()
    }

    pub fn default_body(&self) -> Option<&DefaultBody> {
        self.default_body.as_ref()
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("signature", &self.signature)
            .field("default_body", &self.default_body.is_some())
            .finish()
    }
}

/// A named set of operation signatures. Immutable once built.
#[derive(Debug)]
pub struct Contract {
    name: String,
    operations: Vec<Operation>,
    index: HashMap<OperationSignature, usize>,
}

impl Contract {
    /// Start defining a contract.
    pub fn builder(name: impl Into<String>) -> ContractBuilder {
        ContractBuilder {
            name: name.into(),
            operations: Vec::new(),
        }
    }

    fn assemble(name: String, operations: Vec<Operation>) -> PluginResult<Self> {
        let mut index = HashMap::with_capacity(operations.len());
        for (position, operation) in operations.iter().enumerate() {
            if index.insert(operation.signature.clone(), position).is_some() {
                return Err(PluginError::configuration(
                    name.as_str(),
                    format!("operation {} is declared twice", operation.signature),
                ));
            }
        }
        Ok(Self {
            name,
            operations,
            index,
        })
    }

    /// Catalog from static `(operation, parameter types)` entries that are
    /// known to be unique.
    pub(crate) fn from_catalog(name: &str, entries: &[(&str, &[&str])]) -> Arc<Contract> {
        let operations: Vec<Operation> = entries
            .iter()
            .map(|(operation, params)| Operation {
                signature: OperationSignature::new(*operation, params.iter().copied()),
                default_body: None,
            })
            .collect();
        let index = operations
            .iter()
            .enumerate()
            .map(|(i, op)| (op.signature.clone(), i))
            .collect();
        Arc::new(Self {
            name: name.to_string(),
            operations,
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Operations in declaration order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Whether this is the universal base contract.
    pub fn is_object(&self) -> bool {
        self.name == OBJECT_CONTRACT
    }

    /// Look up an operation by its exact signature.
    pub fn operation(&self, signature: &OperationSignature) -> Option<&Operation> {
        self.index.get(signature).map(|&i| &self.operations[i])
    }

    /// Resolve a declared (name, parameter types) pair to an operation.
    pub fn resolve<P, S>(&self, name: &str, params: P) -> Option<&Operation>
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operation(&OperationSignature::new(name, params))
    }

    pub fn contains(&self, signature: &OperationSignature) -> bool {
        self.index.contains_key(signature)
    }

    /// Resolve an operation into a callable [`Method`] handle.
    pub fn method<P, S>(self: &Arc<Self>, name: &str, params: P) -> PluginResult<Method>
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let signature = OperationSignature::new(name, params);
        match self.index.get(&signature) {
            Some(&index) => Ok(Method {
                contract: Arc::clone(self),
                index,
            }),
            None => Err(PluginError::configuration(
                self.name.as_str(),
                format!("no operation {} on contract {}", signature, self.name),
            )),
        }
    }

    /// Callable handles for every operation, in declaration order.
    pub fn methods(self: &Arc<Self>) -> Vec<Method> {
        (0..self.operations.len())
            .map(|index| Method {
                contract: Arc::clone(self),
                index,
            })
            .collect()
    }
}

impl PartialEq for Contract {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Contract {}

/// Builder for [`Contract`].
pub struct ContractBuilder {
    name: String,
    operations: Vec<Operation>,
}

impl ContractBuilder {
    /// Declare an operation the implementing component must supply.
    pub fn operation<P, S>(mut self, name: impl Into<String>, params: P) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operations.push(Operation {
            signature: OperationSignature::new(name, params),
            default_body: None,
        });
        self
    }

    /// Declare an operation whose body the contract provides itself.
    pub fn default_operation<P, S, F>(mut self, name: impl Into<String>, params: P, body: F) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&dyn Component, &[Value]) -> PluginResult<Value> + Send + Sync + 'static,
    {
        self.operations.push(Operation {
            signature: OperationSignature::new(name, params),
            default_body: Some(Arc::new(body)),
        });
        self
    }

    /// Freeze the catalog. Declaring the same signature twice is an error.
    pub fn build(self) -> PluginResult<Arc<Contract>> {
        if self.name == OBJECT_CONTRACT {
            return Err(PluginError::configuration(
                self.name.as_str(),
                "the universal base contract name is reserved",
            ));
        }
        Contract::assemble(self.name, self.operations).map(Arc::new)
    }
}

// ═══════════════════════════════════════════════════════════════════
// UNIVERSAL BASE CONTRACT
// ═══════════════════════════════════════════════════════════════════

const OBJECT_CATALOG: &[(&str, &[&str])] = &[
    ("identity", &[]),
    ("equals", &["String"]),
    ("to_string", &[]),
];

static OBJECT: Lazy<Arc<Contract>> =
    Lazy::new(|| Contract::from_catalog(OBJECT_CONTRACT, OBJECT_CATALOG));

/// The universal base contract shared by every component.
pub fn object_contract() -> Arc<Contract> {
    Arc::clone(&OBJECT)
}

/// Operations of the universal base contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectMethod {
    /// `identity()`: the component's own id as a string
    Identity,
    /// `equals(String)`: compares an identity against the component's
    Equals,
    /// `to_string()`: human-readable form
    ToString,
}

impl ObjectMethod {
    pub const ALL: [ObjectMethod; 3] = [Self::Identity, Self::Equals, Self::ToString];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Equals => "equals",
            Self::ToString => "to_string",
        }
    }

    pub fn signature(&self) -> OperationSignature {
        match self {
            Self::Equals => OperationSignature::new(self.name(), ["String"]),
            Self::Identity | Self::ToString => OperationSignature::new(self.name(), NO_PARAMS),
        }
    }

    /// Callable handle for this base operation.
    pub fn method(&self) -> Method {
        let index = ObjectMethod::ALL
            .iter()
            .position(|m| m == self)
            .unwrap_or_default();
        Method {
            contract: object_contract(),
            index,
        }
    }

    /// Classify a method as a base operation, if it is one.
    pub fn of(method: &Method) -> Option<ObjectMethod> {
        if !method.contract.is_object() {
            return None;
        }
        ObjectMethod::ALL
            .iter()
            .copied()
            .find(|m| m.name() == method.name())
    }
}

// ═══════════════════════════════════════════════════════════════════
// METHODS
// ═══════════════════════════════════════════════════════════════════

/// Handle to one resolved operation of one contract.
#[derive(Clone)]
pub struct Method {
    contract: Arc<Contract>,
    index: usize,
}

impl Method {
    pub fn contract(&self) -> &Arc<Contract> {
        &self.contract
    }

    pub fn operation(&self) -> &Operation {
        &self.contract.operations[self.index]
    }

    pub fn signature(&self) -> &OperationSignature {
        self.operation().signature()
    }

    pub fn name(&self) -> &str {
        self.operation().name()
    }

    pub fn key(&self) -> MethodKey {
        MethodKey::new(self.contract.name(), self.signature().clone())
    }

    /// Whether the method belongs to the universal base contract.
    pub fn is_object_method(&self) -> bool {
        self.contract.is_object()
    }

    pub fn default_body(&self) -> Option<&DefaultBody> {
        self.operation().default_body()
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        self.contract.name() == other.contract.name() && self.signature() == other.signature()
    }
}

impl Eq for Method {}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Method({})", self.key())
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

// ═══════════════════════════════════════════════════════════════════
// COMPONENT TYPES
// ═══════════════════════════════════════════════════════════════════

/// Runtime type of a component: the contracts it implements directly plus
/// an optional parent type whose contracts it inherits.
#[derive(Debug)]
pub struct ComponentType {
    name: String,
    contracts: Vec<Arc<Contract>>,
    parent: Option<Arc<ComponentType>>,
}

impl ComponentType {
    pub fn new(name: impl Into<String>, contracts: Vec<Arc<Contract>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            contracts,
            parent: None,
        })
    }

    /// A type that inherits every contract of `parent`.
    pub fn extending(
        name: impl Into<String>,
        contracts: Vec<Arc<Contract>>,
        parent: Arc<ComponentType>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            contracts,
            parent: Some(parent),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<ComponentType>> {
        self.parent.as_ref()
    }

    /// Contracts declared on this type itself.
    pub fn own_contracts(&self) -> &[Arc<Contract>] {
        &self.contracts
    }

    /// Every contract implemented directly or through the parent chain,
    /// nearest type first, without duplicates.
    pub fn all_contracts(&self) -> Vec<Arc<Contract>> {
        let mut seen = HashSet::new();
        let mut all = Vec::new();
        let mut current = Some(self);
        while let Some(ty) = current {
            for contract in &ty.contracts {
                if seen.insert(contract.name().to_string()) {
                    all.push(Arc::clone(contract));
                }
            }
            current = ty.parent.as_deref();
        }
        all
    }

    pub fn implements(&self, contract: &str) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty.contracts.iter().any(|c| c.name() == contract) {
                return true;
            }
            current = ty.parent.as_deref();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repository() -> Arc<Contract> {
        Contract::builder("Repository")
            .operation("find", ["String"])
            .operation("find", ["String", "Integer"])
            .operation("count", NO_PARAMS)
            .default_operation("exists", ["String"], |_, _| Ok(json!(true)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolve_by_exact_signature() {
        let contract = repository();
        assert!(contract.resolve("find", ["String"]).is_some());
        assert!(contract.resolve("find", ["String", "Integer"]).is_some());
        assert!(contract.resolve("find", ["Integer"]).is_none());
        assert!(contract.resolve("missing", NO_PARAMS).is_none());
        assert!(contract.resolve("exists", ["String"]).unwrap().has_default_body());
    }

    #[test]
    fn test_duplicate_signature_rejected() {
        let result = Contract::builder("Twice")
            .operation("run", ["String"])
            .operation("run", ["String"])
            .build();
        let err = result.unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn test_object_name_reserved() {
        assert!(Contract::builder(OBJECT_CONTRACT).build().is_err());
    }

    #[test]
    fn test_method_handles() {
        let contract = repository();
        let method = contract.method("count", NO_PARAMS).unwrap();
        assert_eq!(method.key().to_string(), "Repository.count()");
        assert!(!method.is_object_method());
        assert!(contract.method("count", ["String"]).is_err());
        assert_eq!(contract.methods().len(), 4);
    }

    #[test]
    fn test_object_methods() {
        for m in ObjectMethod::ALL {
            let method = m.method();
            assert!(method.is_object_method());
            assert_eq!(ObjectMethod::of(&method), Some(m));
        }
        let method = repository().method("count", NO_PARAMS).unwrap();
        assert_eq!(ObjectMethod::of(&method), None);
    }

    #[test]
    fn test_component_type_walks_parents() {
        let auditable = Contract::builder("Auditable")
            .operation("audit", NO_PARAMS)
            .build()
            .unwrap();
        let base = ComponentType::new("BaseRepo", vec![repository(), auditable]);
        let child = ComponentType::extending("UserRepo", vec![repository()], base);

        let names: Vec<_> = child
            .all_contracts()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["Repository", "Auditable"]);
        assert!(child.implements("Auditable"));
        assert!(!child.implements("Executor"));
    }
}
