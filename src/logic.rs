//! User logic, shipped by name instead of by serialized closure.
//!
//! Coordinator and workers link the same job modules and register the
//! same functions under the same names; the wire carries only an
//! operator identifier plus its captured string arguments. Every
//! operator shape is fallible so that one bad row can fail without
//! poisoning its partition.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::collection::JobContext;
use crate::error::{EmberError, Result};
use crate::kvs::Row;

/// A (key, value) tuple, the element of a paired collection.
pub type Pair = (String, String);

pub type ValueToValuesFn = fn(&[String], &str) -> Result<Vec<String>>;
pub type ValueToPairFn = fn(&[String], &str) -> Result<Option<Pair>>;
pub type ValueToPairsFn = fn(&[String], &str) -> Result<Vec<Pair>>;
pub type ValueToBoolFn = fn(&[String], &str) -> Result<bool>;
pub type PairToValuesFn = fn(&[String], &Pair) -> Result<Vec<String>>;
pub type PairToPairsFn = fn(&[String], &Pair) -> Result<Vec<Pair>>;
pub type RowToValueFn = fn(&[String], &Row) -> Result<Option<String>>;
pub type ReducerFn = fn(&[String], &str, &str) -> Result<String>;
pub type PartitionFn = fn(&[String], Vec<String>) -> Result<Vec<String>>;

/// The closed set of operator shapes. The first argument of every
/// function is the payload's captured arguments.
#[derive(Clone, Copy)]
pub enum Operator {
    /// value -> values (flatMap)
    ValueToValues(ValueToValuesFn),
    /// value -> at most one pair (mapToPair)
    ValueToPair(ValueToPairFn),
    /// value -> pairs (flatMapToPair)
    ValueToPairs(ValueToPairsFn),
    /// value -> keep? (filter)
    ValueToBool(ValueToBoolFn),
    /// pair -> values (pair flatMap)
    PairToValues(PairToValuesFn),
    /// pair -> pairs (pairFlatMapToPair)
    PairToPairs(PairToPairsFn),
    /// row -> at most one value (fromTable)
    RowToValue(RowToValueFn),
    /// (accumulator, value) -> accumulator (fold / foldByKey)
    Reducer(ReducerFn),
    /// whole partition's values -> values (mapPartitions)
    Partition(PartitionFn),
}

impl Operator {
    pub fn shape_name(&self) -> &'static str {
        match self {
            Operator::ValueToValues(_) => "value-to-values",
            Operator::ValueToPair(_) => "value-to-pair",
            Operator::ValueToPairs(_) => "value-to-pairs",
            Operator::ValueToBool(_) => "value-to-bool",
            Operator::PairToValues(_) => "pair-to-values",
            Operator::PairToPairs(_) => "pair-to-pairs",
            Operator::RowToValue(_) => "row-to-value",
            Operator::Reducer(_) => "reducer",
            Operator::Partition(_) => "partition",
        }
    }
}

impl std::fmt::Debug for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.shape_name())
    }
}

/// What actually crosses the network for an operation: the name of a
/// registered operator and the arguments it captured at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicPayload {
    pub operator: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl LogicPayload {
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(operator: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            operator: operator.into(),
            args,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(EmberError::Payload)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(EmberError::Payload)
    }
}

/// An entry point conforms to `entry(context, args)` and drives a job to
/// completion through the context's collections.
pub type EntryPointFn = fn(JobContext, Vec<String>) -> BoxFuture<'static, Result<()>>;

/// Named entry points and operators, shared (by linking, not by wire)
/// between the coordinator and every worker.
#[derive(Default, Clone)]
pub struct LogicRegistry {
    entry_points: HashMap<String, EntryPointFn>,
    operators: HashMap<String, Operator>,
}

impl LogicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_entry(&mut self, name: impl Into<String>, entry: EntryPointFn) {
        self.entry_points.insert(name.into(), entry);
    }

    pub fn register_operator(&mut self, name: impl Into<String>, operator: Operator) {
        self.operators.insert(name.into(), operator);
    }

    pub fn entry_point(&self, name: &str) -> Result<EntryPointFn> {
        self.entry_points
            .get(name)
            .copied()
            .ok_or_else(|| EmberError::UnknownEntryPoint(name.to_string()))
    }

    pub fn operator(&self, name: &str) -> Result<Operator> {
        self.operators
            .get(name)
            .copied()
            .ok_or_else(|| EmberError::UnknownOperator(name.to_string()))
    }

    /// Resolve a payload to a reducer or fail with the shape mismatch.
    pub fn reducer(&self, payload: &LogicPayload, operation: &'static str) -> Result<ReducerFn> {
        match self.operator(&payload.operator)? {
            Operator::Reducer(f) => Ok(f),
            other => Err(EmberError::OperatorShape {
                name: format!("{} ({})", payload.operator, other.shape_name()),
                operation,
            }),
        }
    }

    pub fn into_shared(self) -> Arc<LogicRegistry> {
        Arc::new(self)
    }
}
