//! Standard interception points.
//!
//! The four extensible components the execution pipeline builds per request
//! are published as contracts here so interceptors can declare against them:
//!
//! | Contract | Role |
//! |----------|------|
//! | [`executor`] | Runs mapped statements, owns the local cache and transaction |
//! | [`statement_handler`] | Prepares and runs one statement |
//! | [`parameter_handler`] | Binds parameters onto a prepared statement |
//! | [`result_set_handler`] | Turns result sets into objects |
//!
//! Parameter types are opaque names; they only have to match between a
//! contract and the declarations made against it.

use crate::contract::Contract;
use once_cell::sync::Lazy;
use std::sync::Arc;

pub const EXECUTOR: &str = "Executor";
pub const STATEMENT_HANDLER: &str = "StatementHandler";
pub const PARAMETER_HANDLER: &str = "ParameterHandler";
pub const RESULT_SET_HANDLER: &str = "ResultSetHandler";

const EXECUTOR_OPERATIONS: &[(&str, &[&str])] = &[
    ("update", &["MappedStatement", "Object"]),
    (
        "query",
        &["MappedStatement", "Object", "RowBounds", "ResultHandler", "CacheKey", "BoundSql"],
    ),
    ("query", &["MappedStatement", "Object", "RowBounds", "ResultHandler"]),
    ("query_cursor", &["MappedStatement", "Object", "RowBounds"]),
    ("flush_statements", &[]),
    ("commit", &["boolean"]),
    ("rollback", &["boolean"]),
    ("create_cache_key", &["MappedStatement", "Object", "RowBounds", "BoundSql"]),
    ("is_cached", &["MappedStatement", "CacheKey"]),
    ("clear_local_cache", &[]),
    ("defer_load", &["MappedStatement", "MetaObject", "String", "CacheKey", "Class"]),
    ("get_transaction", &[]),
    ("close", &["boolean"]),
    ("is_closed", &[]),
    ("set_executor_wrapper", &["Executor"]),
];

const STATEMENT_HANDLER_OPERATIONS: &[(&str, &[&str])] = &[
    ("prepare", &["Connection", "Integer"]),
    ("parameterize", &["Statement"]),
    ("batch", &["Statement"]),
    ("update", &["Statement"]),
    ("query", &["Statement", "ResultHandler"]),
    ("query_cursor", &["Statement"]),
    ("get_bound_sql", &[]),
    ("get_parameter_handler", &[]),
];

const PARAMETER_HANDLER_OPERATIONS: &[(&str, &[&str])] = &[
    ("get_parameter_object", &[]),
    ("set_parameters", &["PreparedStatement"]),
];

const RESULT_SET_HANDLER_OPERATIONS: &[(&str, &[&str])] = &[
    ("handle_result_sets", &["Statement"]),
    ("handle_cursor_result_sets", &["Statement"]),
    ("handle_output_parameters", &["CallableStatement"]),
];

static EXECUTOR_CONTRACT: Lazy<Arc<Contract>> =
    Lazy::new(|| Contract::from_catalog(EXECUTOR, EXECUTOR_OPERATIONS));

static STATEMENT_HANDLER_CONTRACT: Lazy<Arc<Contract>> =
    Lazy::new(|| Contract::from_catalog(STATEMENT_HANDLER, STATEMENT_HANDLER_OPERATIONS));

static PARAMETER_HANDLER_CONTRACT: Lazy<Arc<Contract>> =
    Lazy::new(|| Contract::from_catalog(PARAMETER_HANDLER, PARAMETER_HANDLER_OPERATIONS));

static RESULT_SET_HANDLER_CONTRACT: Lazy<Arc<Contract>> =
    Lazy::new(|| Contract::from_catalog(RESULT_SET_HANDLER, RESULT_SET_HANDLER_OPERATIONS));

pub fn executor() -> Arc<Contract> {
    Arc::clone(&EXECUTOR_CONTRACT)
}

pub fn statement_handler() -> Arc<Contract> {
    Arc::clone(&STATEMENT_HANDLER_CONTRACT)
}

pub fn parameter_handler() -> Arc<Contract> {
    Arc::clone(&PARAMETER_HANDLER_CONTRACT)
}

pub fn result_set_handler() -> Arc<Contract> {
    Arc::clone(&RESULT_SET_HANDLER_CONTRACT)
}

/// All standard interception points.
pub fn all() -> Vec<Arc<Contract>> {
    vec![
        executor(),
        statement_handler(),
        parameter_handler(),
        result_set_handler(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogs_are_complete_and_unique() {
        for (contract, expected) in [
            (executor(), EXECUTOR_OPERATIONS.len()),
            (statement_handler(), STATEMENT_HANDLER_OPERATIONS.len()),
            (parameter_handler(), PARAMETER_HANDLER_OPERATIONS.len()),
            (result_set_handler(), RESULT_SET_HANDLER_OPERATIONS.len()),
        ] {
            let distinct: std::collections::HashSet<_> = contract
                .operations()
                .iter()
                .map(|op| op.signature().clone())
                .collect();
            assert_eq!(distinct.len(), expected, "{}", contract.name());
            assert_eq!(contract.operations().len(), expected);
        }
    }

    #[test]
    fn test_query_overloads_resolve() {
        let executor = executor();
        assert!(executor
            .resolve("query", ["MappedStatement", "Object", "RowBounds", "ResultHandler"])
            .is_some());
        assert!(executor
            .resolve(
                "query",
                ["MappedStatement", "Object", "RowBounds", "ResultHandler", "CacheKey", "BoundSql"]
            )
            .is_some());
        assert!(executor.resolve("query", ["MappedStatement"]).is_none());
    }

    #[test]
    fn test_shared_instances() {
        assert!(Arc::ptr_eq(&executor(), &executor()));
        assert_eq!(all().len(), 4);
    }
}
