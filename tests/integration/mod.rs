//! Integration test suite for tickflow.
//!
//! These tests drive roots and workspaces through complete lifecycles
//! against the in-memory store and verify that the executors, managers,
//! callbacks, worker and recovery hooks work together correctly.
//!
//! # Test Categories
//!
//! - `dag_execution`: task DAG traversal, aggregation, idempotence
//! - `callbacks`: callback branch exclusivity and hold-parent WFC
//! - `workspace`: root DAGs inside a workspace
//! - `recovery`: crash hook, stale entities, logical cancellation
//! - `runtime`: the full tokio engine end to end


mod callbacks;
mod dag_execution;
mod runtime;
mod workspace;
