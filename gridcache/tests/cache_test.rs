//! Cache facade behaviour over in-process maps

mod common;

#[cfg(test)]
mod tests {
    use super::common::{FlakyMap, SlowMap, memory_builder, memory_cache};
    use gridcache::{
        CacheError, CacheValue, Capabilities, DecodeMode, GridCache, JsonSerializer, MemoryMap,
        NoopCompressor, PassthroughSerializer, RemoteMap, SingleTopology, Timeout, WireFormat,
        ZstdCompressor,
    };
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_structured_values_roundtrip() {
        let map = MemoryMap::default();
        let cache = memory_builder(&map)
            .serializer(Arc::new(JsonSerializer::new()))
            .compressor(Arc::new(ZstdCompressor::new()))
            .build();

        let profile = CacheValue::Map(BTreeMap::from([
            ("name".to_string(), CacheValue::from("Ada")),
            ("age".to_string(), CacheValue::Int(36)),
            (
                "langs".to_string(),
                CacheValue::List(vec!["rust".into(), "ml".into()]),
            ),
        ]));
        assert_ok!(cache.set("user:1", profile.clone(), Timeout::Default).await);
        assert_eq!(cache.get("user:1").await.unwrap(), Some(profile));
    }

    #[tokio::test]
    async fn test_concurrent_add_stores_exactly_once() {
        let map = MemoryMap::default();
        let cache = memory_cache(&map);

        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.add("lock", format!("owner-{}", i)).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(map.len(), 1);
    }

    #[tokio::test]
    async fn test_set_many_then_get_many() {
        let cache = memory_cache(&MemoryMap::default());
        cache
            .set_many([("a", 1), ("b", 2)], Timeout::Default)
            .await
            .unwrap();

        let found = cache.get_many(["a", "b", "c"]).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found.get("a"), Some(&CacheValue::Int(1)));
        assert_eq!(found.get("b"), Some(&CacheValue::Int(2)));
        assert!(!found.contains_key("c"));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = memory_cache(&MemoryMap::default());
        cache.set("k", "v", Timeout::Seconds(1)).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(1200)).await;

        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_timeout_is_never_readable() {
        let cache = memory_cache(&MemoryMap::default());
        cache.set("k", "v", Timeout::Seconds(0)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_never_expiring_entries() {
        let map = MemoryMap::default();
        let cache = memory_builder(&map).default_timeout(Some(1)).build();
        cache.set("forever", 1, Timeout::Never).await.unwrap();
        cache.set("short", 1, Timeout::Default).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1200)).await;

        assert!(cache.has_key("forever").await.unwrap());
        assert!(!cache.has_key("short").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_everything() {
        let map = MemoryMap::default();
        let cache = memory_cache(&map);
        cache
            .set_many([("a", 1), ("b", 2), ("c", 3)], Timeout::Default)
            .await
            .unwrap();

        assert_eq!(cache.clear(None).await.unwrap(), 3);
        assert!(cache.get_many(["a", "b", "c"]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_version_keeps_other_versions() {
        let cache = memory_cache(&MemoryMap::default());
        cache.set(("a", 1), "old", Timeout::Default).await.unwrap();
        cache.set(("a", 2), "new", Timeout::Default).await.unwrap();

        assert_eq!(cache.clear(Some(1)).await.unwrap(), 1);
        assert_eq!(cache.get(("a", 1)).await.unwrap(), None);
        assert_eq!(cache.get(("a", 2)).await.unwrap(), Some(CacheValue::from("new")));
    }

    #[tokio::test]
    async fn test_clear_without_scan_is_not_supported() {
        let map = MemoryMap::default().with_capabilities(Capabilities {
            clear: true,
            ..Capabilities::BASIC
        });
        let cache = memory_cache(&map);
        assert!(matches!(
            cache.clear(Some(1)).await.unwrap_err(),
            CacheError::NotSupported(_)
        ));
        assert_ok!(cache.clear(None).await);
    }

    #[tokio::test]
    async fn test_incr_without_primitive_is_not_supported() {
        let cache = memory_cache(&MemoryMap::default().with_capabilities(Capabilities::BASIC));
        assert!(matches!(
            cache.incr("counter", 1).await.unwrap_err(),
            CacheError::NotSupported(_)
        ));
    }

    #[tokio::test]
    async fn test_numeric_strings_read_back_as_integers() {
        let cache = memory_builder(&MemoryMap::default())
            .serializer(Arc::new(PassthroughSerializer::new().text(true)))
            .compressor(Arc::new(NoopCompressor::new()))
            .build();

        cache.set("k", "42", Timeout::Default).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(CacheValue::Int(42)));
    }

    #[tokio::test]
    async fn test_tagged_wire_format_keeps_numeric_strings() {
        let cache = memory_builder(&MemoryMap::default())
            .serializer(Arc::new(PassthroughSerializer::new().text(true)))
            .compressor(Arc::new(NoopCompressor::new()))
            .wire_format(WireFormat::Tagged)
            .build();

        cache.set("s", "42", Timeout::Default).await.unwrap();
        cache.set("n", 42, Timeout::Default).await.unwrap();
        assert_eq!(cache.get("s").await.unwrap(), Some(CacheValue::from("42")));
        assert_eq!(cache.get("n").await.unwrap(), Some(CacheValue::Int(42)));
    }

    #[tokio::test]
    async fn test_undecodable_payloads() {
        let map = MemoryMap::default();
        map.put(":1:k", b"\xc1garbage".to_vec(), None).await.unwrap();

        let strict = memory_cache(&map);
        assert!(matches!(
            strict.get("k").await.unwrap_err(),
            CacheError::Decoding(_)
        ));

        let lenient = memory_builder(&map).decode_mode(DecodeMode::Lenient).build();
        assert_eq!(
            lenient.get("k").await.unwrap(),
            Some(CacheValue::Bytes(b"\xc1garbage".to_vec()))
        );
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let map = SlowMap {
            inner: MemoryMap::default(),
            delay: Duration::from_millis(500),
        };
        let cache = GridCache::builder(Arc::new(SingleTopology::new(Arc::new(map))))
            .operation_timeout(Duration::from_millis(50))
            .build();

        let err = cache.get("k").await.unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(
            cache.set("k", 1, Timeout::Default).await.unwrap_err(),
            CacheError::Timeout
        ));
    }

    #[tokio::test]
    async fn test_partial_write_names_failed_keys() {
        let inner = MemoryMap::default();
        let map = FlakyMap {
            inner: inner.clone(),
            rejected: HashSet::from([":1:b".to_string(), ":1:d".to_string()]),
        };
        let cache = GridCache::builder(Arc::new(SingleTopology::new(Arc::new(map)))).build();

        let err = cache
            .set_many([("a", 1), ("b", 2), ("c", 3), ("d", 4)], Timeout::Default)
            .await
            .unwrap_err();

        match err {
            CacheError::PartialWrite { failed, source } => {
                assert_eq!(failed, vec!["b".to_string(), "d".to_string()]);
                assert!(matches!(*source, CacheError::Server(_)));
            }
            other => panic!("expected partial write, got {:?}", other),
        }
        assert_eq!(inner.len(), 2);
        assert!(inner.peek(":1:a").is_some());
        assert!(inner.peek(":1:c").is_some());
    }

    #[tokio::test]
    async fn test_key_prefix_and_default_version() {
        let map = MemoryMap::default();
        let cache = memory_builder(&map).key_prefix("app").version(7).build();

        cache.set("k", 1, Timeout::Default).await.unwrap();
        assert!(map.peek("app:7:k").is_some());
        assert_eq!(cache.incr_version("k", 1).await.unwrap(), 8);
        assert!(map.peek("app:8:k").is_some());
        assert!(map.peek("app:7:k").is_none());
    }

    #[tokio::test]
    async fn test_operations_run_under_the_cache_span() {
        let map = MemoryMap::default();
        let cache = memory_builder(&map)
            .span(tracing::info_span!("tenant", id = 42))
            .build();

        assert_ok!(cache.set("k", 1, Timeout::Default).await);
        assert_eq!(cache.get("k").await.unwrap(), Some(CacheValue::Int(1)));
    }
}
