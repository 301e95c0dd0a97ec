//! Applies one operation to one partition's row stream.
//!
//! Rows are read from the input table restricted to the partition's key
//! range and results are written to the output table. A single row whose
//! operator application fails is logged and skipped; a payload that does
//! not decode, an operator of the wrong shape, and storage failures all
//! fail the whole partition.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{EmberError, Result};
use crate::kvs::KvsClient;
use crate::logic::{
    LogicPayload, Operator, PairToPairsFn, PairToValuesFn, PartitionFn, ReducerFn, RowToValueFn,
    ValueToBoolFn, ValueToPairFn, ValueToPairsFn, ValueToValuesFn,
};
use crate::ops::{OperationKind, OperationQuery};
use crate::worker::WorkerState;

pub async fn execute(
    state: &WorkerState,
    op: OperationKind,
    query: &OperationQuery,
    body: &[u8],
) -> Result<String> {
    let kvs = state.storage.connect(&query.kvs_hostname).await?;

    // Join is the one operation with no logic payload; its work is fully
    // described by the two table names.
    if !op.carries_payload() {
        join(kvs, query).await?;
        return Ok(format!("{op} operation completed"));
    }

    let payload = LogicPayload::decode(body)?;
    match op {
        OperationKind::FlatMap => {
            let f = match state.registry.operator(&payload.operator)? {
                Operator::ValueToValues(f) => f,
                other => return Err(shape_error(&payload, other, op)),
            };
            flat_map(kvs, query, f, &payload.args).await?;
        }
        OperationKind::MapToPair => {
            let f = match state.registry.operator(&payload.operator)? {
                Operator::ValueToPair(f) => f,
                other => return Err(shape_error(&payload, other, op)),
            };
            map_to_pair(kvs, query, f, &payload.args).await?;
        }
        OperationKind::FlatMapToPair => {
            let f = match state.registry.operator(&payload.operator)? {
                Operator::ValueToPairs(f) => f,
                other => return Err(shape_error(&payload, other, op)),
            };
            flat_map_to_pair(kvs, query, f, &payload.args).await?;
        }
        OperationKind::PairFlatMap => {
            let f = match state.registry.operator(&payload.operator)? {
                Operator::PairToValues(f) => f,
                other => return Err(shape_error(&payload, other, op)),
            };
            pair_flat_map(kvs, query, f, &payload.args).await?;
        }
        OperationKind::PairFlatMapToPair => {
            let f = match state.registry.operator(&payload.operator)? {
                Operator::PairToPairs(f) => f,
                other => return Err(shape_error(&payload, other, op)),
            };
            pair_flat_map_to_pair(kvs, query, f, &payload.args).await?;
        }
        OperationKind::Filter => {
            let f = match state.registry.operator(&payload.operator)? {
                Operator::ValueToBool(f) => f,
                other => return Err(shape_error(&payload, other, op)),
            };
            filter(kvs, query, f, &payload.args).await?;
        }
        OperationKind::FromTable => {
            let f = match state.registry.operator(&payload.operator)? {
                Operator::RowToValue(f) => f,
                other => return Err(shape_error(&payload, other, op)),
            };
            from_table(kvs, query, f, &payload.args).await?;
        }
        OperationKind::FoldByKey => {
            let f = state.registry.reducer(&payload, "foldByKey")?;
            fold_by_key(kvs, query, f, &payload.args).await?;
        }
        OperationKind::MapPartitions => {
            let f = match state.registry.operator(&payload.operator)? {
                Operator::Partition(f) => f,
                other => return Err(shape_error(&payload, other, op)),
            };
            map_partitions(kvs, query, f, &payload.args).await?;
        }
        OperationKind::Fold => {
            let f = state.registry.reducer(&payload, "fold")?;
            // fold's response carries data: the partition's partial
            // accumulator.
            return fold(kvs, query, f, &payload.args).await;
        }
        OperationKind::Join => {
            return Err(EmberError::Internal(
                "join dispatched with a logic payload".to_string(),
            ));
        }
    }
    Ok(format!("{op} operation completed"))
}

fn shape_error(payload: &LogicPayload, got: Operator, op: OperationKind) -> EmberError {
    EmberError::OperatorShape {
        name: format!("{} ({})", payload.operator, got.shape_name()),
        operation: op.as_str(),
    }
}

async fn scan_partition(kvs: &Arc<dyn KvsClient>, query: &OperationQuery) -> Result<Vec<crate::kvs::Row>> {
    kvs.scan(
        &query.input_table,
        query.from_row_inclusive.as_deref(),
        query.to_row_exclusive.as_deref(),
    )
    .await
}

fn skip_row(table: &str, row: &str, error: &EmberError) {
    tracing::warn!(table, row, error = %error, "Logic failed for row, skipping");
}

/// One output row per emitted value, under a fresh collision-free key.
async fn flat_map(
    kvs: Arc<dyn KvsClient>,
    query: &OperationQuery,
    f: ValueToValuesFn,
    args: &[String],
) -> Result<()> {
    for row in scan_partition(&kvs, query).await? {
        let Some(value) = row.first_value() else {
            continue;
        };
        match f(args, &value) {
            Ok(values) => {
                for out in values {
                    let key = format!("{}-{}", row.key, Uuid::new_v4().simple());
                    kvs.put(&query.output_table, &key, "value", out.as_bytes())
                        .await?;
                }
            }
            Err(e) => skip_row(&query.input_table, &row.key, &e),
        }
    }
    Ok(())
}

/// Output row key is the pair key; the column is the input row key so
/// that two inputs mapping to the same key both survive.
async fn map_to_pair(
    kvs: Arc<dyn KvsClient>,
    query: &OperationQuery,
    f: ValueToPairFn,
    args: &[String],
) -> Result<()> {
    for row in scan_partition(&kvs, query).await? {
        let Some(value) = row.first_value() else {
            continue;
        };
        match f(args, &value) {
            Ok(Some((key, out))) => {
                kvs.put(&query.output_table, &key, &row.key, out.as_bytes())
                    .await?;
            }
            Ok(None) => {}
            Err(e) => skip_row(&query.input_table, &row.key, &e),
        }
    }
    Ok(())
}

async fn flat_map_to_pair(
    kvs: Arc<dyn KvsClient>,
    query: &OperationQuery,
    f: ValueToPairsFn,
    args: &[String],
) -> Result<()> {
    for row in scan_partition(&kvs, query).await? {
        let Some(value) = row.first_value() else {
            continue;
        };
        match f(args, &value) {
            Ok(pairs) => {
                for (key, out) in pairs {
                    let column = format!("col-{}", Uuid::new_v4().simple());
                    kvs.put(&query.output_table, &key, &column, out.as_bytes())
                        .await?;
                }
            }
            Err(e) => skip_row(&query.input_table, &row.key, &e),
        }
    }
    Ok(())
}

/// Every column under a row key is one (key, value) pair.
async fn pair_flat_map(
    kvs: Arc<dyn KvsClient>,
    query: &OperationQuery,
    f: PairToValuesFn,
    args: &[String],
) -> Result<()> {
    for row in scan_partition(&kvs, query).await? {
        for value in row.columns.values() {
            let pair = (
                row.key.clone(),
                String::from_utf8_lossy(value).into_owned(),
            );
            match f(args, &pair) {
                Ok(values) => {
                    for out in values {
                        let column = format!("col-{}", Uuid::new_v4().simple());
                        kvs.put(&query.output_table, &row.key, &column, out.as_bytes())
                            .await?;
                    }
                }
                Err(e) => skip_row(&query.input_table, &row.key, &e),
            }
        }
    }
    Ok(())
}

async fn pair_flat_map_to_pair(
    kvs: Arc<dyn KvsClient>,
    query: &OperationQuery,
    f: PairToPairsFn,
    args: &[String],
) -> Result<()> {
    for row in scan_partition(&kvs, query).await? {
        for value in row.columns.values() {
            let pair = (
                row.key.clone(),
                String::from_utf8_lossy(value).into_owned(),
            );
            match f(args, &pair) {
                Ok(pairs) => {
                    for (key, out) in pairs {
                        let column = format!("col-{}", Uuid::new_v4().simple());
                        kvs.put(&query.output_table, &key, &column, out.as_bytes())
                            .await?;
                    }
                }
                Err(e) => skip_row(&query.input_table, &row.key, &e),
            }
        }
    }
    Ok(())
}

/// Surviving values keep their input row key under a fresh column.
async fn filter(
    kvs: Arc<dyn KvsClient>,
    query: &OperationQuery,
    f: ValueToBoolFn,
    args: &[String],
) -> Result<()> {
    for row in scan_partition(&kvs, query).await? {
        let Some(value) = row.first_value() else {
            continue;
        };
        match f(args, &value) {
            Ok(true) => {
                let column = format!("col-{}", Uuid::new_v4().simple());
                kvs.put(&query.output_table, &row.key, &column, value.as_bytes())
                    .await?;
            }
            Ok(false) => {}
            Err(e) => skip_row(&query.input_table, &row.key, &e),
        }
    }
    Ok(())
}

async fn from_table(
    kvs: Arc<dyn KvsClient>,
    query: &OperationQuery,
    f: RowToValueFn,
    args: &[String],
) -> Result<()> {
    for row in scan_partition(&kvs, query).await? {
        match f(args, &row) {
            Ok(Some(out)) => {
                let key = format!("{}-{}", row.key, Uuid::new_v4().simple());
                kvs.put(&query.output_table, &key, "value", out.as_bytes())
                    .await?;
            }
            Ok(None) => {}
            Err(e) => skip_row(&query.input_table, &row.key, &e),
        }
    }
    Ok(())
}

/// Fold every column under each row key from the zero element, writing
/// one result per key. A pair key is a single row and a row belongs to
/// exactly one partition, so this is the whole fold for the key.
async fn fold_by_key(
    kvs: Arc<dyn KvsClient>,
    query: &OperationQuery,
    f: ReducerFn,
    args: &[String],
) -> Result<()> {
    let zero = query
        .zero_element
        .as_deref()
        .ok_or_else(|| EmberError::Internal("foldByKey requires zeroElement".to_string()))?;

    'rows: for row in scan_partition(&kvs, query).await? {
        let mut acc = zero.to_string();
        for value in row.columns.values() {
            let value = String::from_utf8_lossy(value);
            match f(args, &acc, &value) {
                Ok(next) => acc = next,
                Err(e) => {
                    skip_row(&query.input_table, &row.key, &e);
                    continue 'rows;
                }
            }
        }
        kvs.put(&query.output_table, &row.key, "result", acc.as_bytes())
            .await?;
    }
    Ok(())
}

/// Fold every value in the partition and return the partial accumulator
/// as the response body.
async fn fold(
    kvs: Arc<dyn KvsClient>,
    query: &OperationQuery,
    f: ReducerFn,
    args: &[String],
) -> Result<String> {
    let zero = query
        .zero_element
        .as_deref()
        .ok_or_else(|| EmberError::Internal("fold requires zeroElement".to_string()))?;

    let mut acc = zero.to_string();
    for row in scan_partition(&kvs, query).await? {
        for value in row.columns.values() {
            let value = String::from_utf8_lossy(value);
            match f(args, &acc, &value) {
                Ok(next) => acc = next,
                Err(e) => skip_row(&query.input_table, &row.key, &e),
            }
        }
    }
    Ok(acc)
}

/// Inner join on key. The second table's slice of this partition's key
/// range is hashed in memory, then matched against the first table's
/// rows; both tables share the same key ring, so keys outside the range
/// cannot match.
async fn join(kvs: Arc<dyn KvsClient>, query: &OperationQuery) -> Result<()> {
    let other_table = query
        .input_table2
        .as_deref()
        .ok_or_else(|| EmberError::Internal("join requires inputTable2".to_string()))?;

    let other_rows = kvs
        .scan(
            other_table,
            query.from_row_inclusive.as_deref(),
            query.to_row_exclusive.as_deref(),
        )
        .await?;
    let mut other: HashMap<String, Vec<String>> = HashMap::new();
    for row in other_rows {
        let values = other.entry(row.key.clone()).or_default();
        for value in row.columns.values() {
            values.push(String::from_utf8_lossy(value).into_owned());
        }
    }

    for row in scan_partition(&kvs, query).await? {
        let Some(other_values) = other.get(&row.key) else {
            continue;
        };
        for (column, value) in &row.columns {
            let value = String::from_utf8_lossy(value);
            for other_value in other_values {
                let out_column = format!("{column}-{}", Uuid::new_v4().simple());
                let combined = format!("{value},{other_value}");
                kvs.put(&query.output_table, &row.key, &out_column, combined.as_bytes())
                    .await?;
            }
        }
    }
    Ok(())
}

/// Hand the whole partition's values to the operator at once. A failure
/// here is a failure of the entire partition, not of one row.
async fn map_partitions(
    kvs: Arc<dyn KvsClient>,
    query: &OperationQuery,
    f: PartitionFn,
    args: &[String],
) -> Result<()> {
    let values: Vec<String> = scan_partition(&kvs, query)
        .await?
        .iter()
        .filter_map(|row| row.first_value())
        .collect();

    for out in f(args, values)? {
        let key = Uuid::new_v4().simple().to_string();
        kvs.put(&query.output_table, &key, "value", out.as_bytes())
            .await?;
    }
    Ok(())
}
