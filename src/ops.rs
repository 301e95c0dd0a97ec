//! The operation-dispatch wire protocol.
//!
//! Operations form a fixed, closed set; anything outside it is rejected
//! locally before a single network call is made. Table names, key
//! bounds, and the operation-specific extras travel as query parameters;
//! the logic payload rides in the request body.

use serde::{Deserialize, Serialize};

use crate::error::{EmberError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    FlatMap,
    FlatMapToPair,
    PairFlatMapToPair,
    MapToPair,
    PairFlatMap,
    FoldByKey,
    FromTable,
    Join,
    Fold,
    Filter,
    MapPartitions,
}

impl OperationKind {
    pub const ALL: [OperationKind; 11] = [
        OperationKind::FlatMap,
        OperationKind::FlatMapToPair,
        OperationKind::PairFlatMapToPair,
        OperationKind::MapToPair,
        OperationKind::PairFlatMap,
        OperationKind::FoldByKey,
        OperationKind::FromTable,
        OperationKind::Join,
        OperationKind::Fold,
        OperationKind::Filter,
        OperationKind::MapPartitions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::FlatMap => "flatMap",
            OperationKind::FlatMapToPair => "flatMapToPair",
            OperationKind::PairFlatMapToPair => "pairFlatMapToPair",
            OperationKind::MapToPair => "mapToPair",
            OperationKind::PairFlatMap => "pairFlatMap",
            OperationKind::FoldByKey => "foldByKey",
            OperationKind::FromTable => "fromTable",
            OperationKind::Join => "join",
            OperationKind::Fold => "fold",
            OperationKind::Filter => "filter",
            OperationKind::MapPartitions => "mapPartitions",
        }
    }

    /// Worker endpoint for this operation.
    pub fn path(&self) -> String {
        format!("/rdd/{}", self.as_str())
    }

    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == name)
            .ok_or_else(|| EmberError::UnknownOperation(name.to_string()))
    }

    /// Whether the dispatcher keeps each partition's response body.
    /// Only fold returns per-partition partial results.
    pub fn collects_results(&self) -> bool {
        matches!(self, OperationKind::Fold)
    }

    /// Join ships no logic payload; its per-partition work is fully
    /// described by the two table names.
    pub fn carries_payload(&self) -> bool {
        !matches!(self, OperationKind::Join)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query parameters of one partition call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationQuery {
    pub input_table: String,
    pub output_table: String,
    pub kvs_hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_row_inclusive: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_row_exclusive: Option<String>,
    /// Zero element for fold / foldByKey.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zero_element: Option<String>,
    /// Second input table for join.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_table2: Option<String>,
}

impl OperationQuery {
    pub fn new(
        input_table: impl Into<String>,
        output_table: impl Into<String>,
        kvs_hostname: impl Into<String>,
    ) -> Self {
        Self {
            input_table: input_table.into(),
            output_table: output_table.into(),
            kvs_hostname: kvs_hostname.into(),
            from_row_inclusive: None,
            to_row_exclusive: None,
            zero_element: None,
            input_table2: None,
        }
    }
}
