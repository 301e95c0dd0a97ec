//! Laws of the unpaired collection operations, run against a real
//! cluster over the in-memory store.

mod common;

use common::TestCluster;
use ember::kvs::KvsClient;
use ember::logic::LogicPayload;

fn sorted(mut values: Vec<String>) -> Vec<String> {
    values.sort();
    values
}

#[tokio::test]
async fn parallelize_then_collect_round_trips() {
    let cluster = TestCluster::start(2).await;
    let ctx = cluster.context();

    let data: Vec<String> = ["pear", "apple", "quince"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let rdd = ctx.parallelize(data.clone()).await.unwrap();

    assert_eq!(sorted(rdd.collect().await.unwrap()), sorted(data));
    assert_eq!(rdd.count().await.unwrap(), 3);
}

#[tokio::test]
async fn map_preserves_count_for_total_functions() {
    let cluster = TestCluster::start(2).await;
    let ctx = cluster.context();

    let data: Vec<String> = (0..20).map(|i| format!("value-{i}")).collect();
    let rdd = ctx.parallelize(data).await.unwrap();
    let mapped = rdd.flat_map(LogicPayload::new("identity")).await.unwrap();

    assert_eq!(mapped.count().await.unwrap(), rdd.count().await.unwrap());
}

#[tokio::test]
async fn flat_map_grows_cardinality_without_collisions() {
    let cluster = TestCluster::start(1).await;
    let ctx = cluster.context();

    let rdd = ctx
        .parallelize(vec!["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    let doubled = rdd.flat_map(LogicPayload::new("dup")).await.unwrap();

    assert_eq!(doubled.count().await.unwrap(), 4);
    assert_eq!(
        sorted(doubled.collect().await.unwrap()),
        vec!["a", "a", "b", "b"]
    );
}

#[tokio::test]
async fn filter_is_idempotent() {
    let cluster = TestCluster::start(2).await;
    let ctx = cluster.context();

    let data: Vec<String> = ["a", "long-enough", "bb", "also-long-enough", "c"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let rdd = ctx.parallelize(data).await.unwrap();

    let payload = LogicPayload::with_args("min-len", vec!["3".to_string()]);
    let once = rdd.filter(payload.clone()).await.unwrap();
    let twice = once.filter(payload).await.unwrap();

    let expected = vec!["also-long-enough".to_string(), "long-enough".to_string()];
    assert_eq!(sorted(once.collect().await.unwrap()), expected);
    assert_eq!(sorted(twice.collect().await.unwrap()), expected);
}

#[tokio::test]
async fn take_returns_at_most_n_in_scan_order() {
    let cluster = TestCluster::start(1).await;
    let ctx = cluster.context();

    let data: Vec<String> = (0..5).map(|i| format!("v{i}")).collect();
    let rdd = ctx.parallelize(data).await.unwrap();

    assert_eq!(rdd.take(3).await.unwrap().len(), 3);
    assert_eq!(rdd.take(10).await.unwrap().len(), 5);
}

#[tokio::test]
async fn distinct_collapses_duplicates_locally() {
    let cluster = TestCluster::start(1).await;
    let ctx = cluster.context();

    let data: Vec<String> = ["x", "y", "x", "z", "y", "x"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let rdd = ctx.parallelize(data).await.unwrap();
    let distinct = rdd.distinct().await.unwrap();

    assert_eq!(sorted(distinct.collect().await.unwrap()), vec!["x", "y", "z"]);
}

#[tokio::test]
async fn save_as_renames_and_the_old_name_stops_resolving() {
    let cluster = TestCluster::start(1).await;
    let ctx = cluster.context();

    let data: Vec<String> = ["one", "two"].iter().map(|s| s.to_string()).collect();
    let rdd = ctx.parallelize(data.clone()).await.unwrap();
    let before = sorted(rdd.collect().await.unwrap());
    let old_name = rdd.table().to_string();

    let saved = rdd.save_as("kept-values").await.unwrap();
    assert_eq!(saved.table(), "kept-values");
    assert_eq!(sorted(saved.collect().await.unwrap()), before);
    assert_eq!(cluster.kvs.count(&old_name).await.unwrap(), 0);
}

#[tokio::test]
async fn save_as_surfaces_a_refused_rename() {
    let cluster = TestCluster::start(1).await;
    let ctx = cluster.context();

    cluster.kvs.put("occupied", "k", "value", b"v").await.unwrap();
    let rdd = ctx.parallelize(vec!["a".to_string()]).await.unwrap();

    let err = rdd.save_as("occupied").await.unwrap_err();
    assert!(err.to_string().contains("occupied"));
}

#[tokio::test]
async fn destroy_drops_the_table() {
    let cluster = TestCluster::start(1).await;
    let ctx = cluster.context();

    let rdd = ctx.parallelize(vec!["a".to_string()]).await.unwrap();
    let table = rdd.table().to_string();
    rdd.destroy().await.unwrap();

    assert_eq!(cluster.kvs.count(&table).await.unwrap(), 0);
}

#[tokio::test]
async fn map_partitions_sees_whole_partitions() {
    let cluster = TestCluster::start(1).await;
    let ctx = cluster.context();

    let data: Vec<String> = (0..3).map(|i| format!("v{i}")).collect();
    let rdd = ctx.parallelize(data).await.unwrap();
    let batched = rdd
        .map_partitions(LogicPayload::new("count-batch"))
        .await
        .unwrap();

    // A single-node ring still dispatches two partitions (the range and
    // its wraparound), so the batch operator runs twice: once over all
    // three values and once over the empty wrap segment.
    assert_eq!(sorted(batched.collect().await.unwrap()), vec!["0", "3"]);
}

#[tokio::test]
async fn from_table_builds_a_collection_from_existing_rows() {
    let cluster = TestCluster::start(1).await;
    let ctx = cluster.context();

    cluster.kvs.put("src", "r1", "value", b"x").await.unwrap();
    cluster.kvs.put("src", "r2", "value", b"y").await.unwrap();

    let rdd = ctx
        .from_table("src", LogicPayload::new("row-first"))
        .await
        .unwrap();
    assert_eq!(sorted(rdd.collect().await.unwrap()), vec!["x", "y"]);
}
