//! Basic gridcache usage
//!
//! Runs against an in-process map so it needs no grid. Swap the topology for
//! `GridCache::from_settings` to talk to a real cluster.

use gridcache::{
    CacheValue, GridCache, MemoryMap, SingleTopology, Timeout, ZstdCompressor,
};
use std::collections::BTreeMap;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("🗄️  gridcache - Basic Example\n");

    let map = MemoryMap::default();
    let cache = GridCache::builder(Arc::new(SingleTopology::new(Arc::new(map.clone()))))
        .key_prefix("demo")
        .compressor(Arc::new(ZstdCompressor::new()))
        .build();

    // Plain values
    cache.set("greeting", "Hello, grid!", Timeout::Default).await?;
    println!("greeting = {:?}", cache.get("greeting").await?);

    // Structured values go through the serializer and compressor
    let profile = CacheValue::Map(BTreeMap::from([
        ("name".to_string(), CacheValue::from("Ada")),
        ("langs".to_string(), CacheValue::List(vec!["rust".into(), "c".into()])),
    ]));
    cache.set("user:1", profile, Timeout::Seconds(300)).await?;
    println!("user:1 = {:?}", cache.get("user:1").await?);

    // Integers are stored as text and can be incremented in place
    cache.set("visits", 10, Timeout::Never).await?;
    println!("visits = {}", cache.incr("visits", 5).await?);

    // add only writes absent keys
    println!("add lock = {}", cache.add("lock", "worker-1").await?);
    println!("add lock again = {}", cache.add("lock", "worker-2").await?);

    // Batches
    cache
        .set_many([("a", 1), ("b", 2), ("c", 3)], Timeout::Default)
        .await?;
    let found = cache.get_many(["a", "b", "z"]).await?;
    println!("get_many = {:?}", found);

    // Versions
    let new_version = cache.incr_version("greeting", 1).await?;
    println!(
        "greeting moved to version {}: {:?}",
        new_version,
        cache.get(("greeting", new_version)).await?
    );
    println!("stored keys: {}", map.len());

    let removed = cache.clear(None).await?;
    println!("\n✅ Cleared {} entries", removed);

    Ok(())
}
