//! Bundled job module.
//!
//! Jobs are ordinary Rust functions linked into both the coordinator and
//! the workers; registering them under the same names on every process
//! is what lets the wire carry only operator identifiers. The word-count
//! job here doubles as a smoke test for a fresh cluster.

use futures::future::BoxFuture;

use crate::collection::JobContext;
use crate::error::{EmberError, Result};
use crate::logic::{LogicPayload, LogicRegistry, Operator, Pair};

/// Register the bundled entry points and operators.
pub fn register(registry: &mut LogicRegistry) {
    registry.register_operator("split-whitespace", Operator::ValueToValues(split_whitespace));
    registry.register_operator("pair-with-one", Operator::ValueToPair(pair_with_one));
    registry.register_operator("sum", Operator::Reducer(sum));
    registry.register_entry("word-count", word_count);
}

fn split_whitespace(_args: &[String], value: &str) -> Result<Vec<String>> {
    Ok(value.split_whitespace().map(str::to_string).collect())
}

fn pair_with_one(_args: &[String], value: &str) -> Result<Option<Pair>> {
    Ok(Some((value.to_string(), "1".to_string())))
}

fn sum(_args: &[String], acc: &str, value: &str) -> Result<String> {
    let acc: i64 = acc
        .parse()
        .map_err(|_| EmberError::Logic(format!("not an integer: {acc:?}")))?;
    let value: i64 = value
        .parse()
        .map_err(|_| EmberError::Logic(format!("not an integer: {value:?}")))?;
    Ok((acc + value).to_string())
}

/// Count words across the argument lines and emit `word: count` lines
/// sorted by word.
fn word_count(ctx: JobContext, args: Vec<String>) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let lines = ctx.parallelize(args).await?;
        let words = lines.flat_map(LogicPayload::new("split-whitespace")).await?;
        let pairs = words.map_to_pair(LogicPayload::new("pair-with-one")).await?;
        let counts = pairs.fold_by_key("0", LogicPayload::new("sum")).await?;

        let mut out = counts.collect().await?;
        out.sort();
        for (word, count) in out {
            ctx.output(&format!("{word}: {count}\n"));
        }
        Ok(())
    })
}
