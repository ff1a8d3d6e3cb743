//! Shared types used across the interception layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Argument and result value passed through every call.
pub type Value = serde_json::Value;

/// Unique identifier (UUID-based).
///
/// Synthesized wrappers and dispatch proxies take a fresh one so that the
/// universal `identity()` operation distinguishes them from their targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueId(pub Uuid);

impl UniqueId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for UniqueId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UniqueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UniqueId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Parameter list of an operation that takes no arguments.
pub const NO_PARAMS: [&str; 0] = [];

/// Name plus ordered parameter type names of one operation.
///
/// Two signatures are the same operation only when both the name and every
/// parameter type match, so overloads stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationSignature {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
}

impl OperationSignature {
    pub fn new<P, S>(name: impl Into<String>, params: P) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl std::fmt::Display for OperationSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.params.join(", "))
    }
}

/// Key identifying one operation of one contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodKey {
    pub contract: String,
    pub signature: OperationSignature,
}

impl MethodKey {
    pub fn new(contract: impl Into<String>, signature: OperationSignature) -> Self {
        Self {
            contract: contract.into(),
            signature,
        }
    }
}

impl std::fmt::Display for MethodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.contract, self.signature)
    }
}
