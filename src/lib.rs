//! Ember: a small distributed dataflow engine.
//!
//! A client submits a code package plus arguments to a coordinator,
//! which distributes the package to registered workers and runs the
//! job's entry point. The entry point works through [`collection`]
//! handles over named tables in an external partitioned key-value
//! store; every transformation is dispatched in parallel across the
//! store's key ranges, one live worker per range.

pub mod collection;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod kvs;
pub mod logic;
pub mod ops;
pub mod partition;
pub mod registry;
pub mod shutdown;
pub mod worker;
