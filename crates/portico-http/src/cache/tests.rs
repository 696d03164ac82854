//! Unit tests for the response cache

use super::*;
use crate::api::ResponseBody;

use proptest::prelude::*;

fn create_test_response(body: &str) -> HttpResponse {
    HttpResponse {
        data: ResponseBody::Text(body.to_string()),
        status: 200,
        status_text: "OK".to_string(),
        headers: BTreeMap::from([("content-type".to_string(), "text/plain".to_string())]),
        ok: true,
    }
}

#[test]
fn test_cache_insert_and_get() {
    let cache = RequestCache::new(Duration::from_secs(60));
    cache.set("GET:/featured".to_string(), create_test_response("featured"));

    let retrieved = cache.get("GET:/featured");
    assert_eq!(retrieved.unwrap().text(), Some("featured"));
    assert!(cache.get("GET:/missing").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_entry_expires_at_ttl() {
    let cache = RequestCache::new(Duration::from_secs(1));
    cache.set("key".to_string(), create_test_response("payload"));

    tokio::time::advance(Duration::from_millis(999)).await;
    assert!(cache.get("key").is_some());

    tokio::time::advance(Duration::from_millis(1)).await;
    assert!(cache.get("key").is_none());
    // Lazy eviction removed the stale entry on read
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cache_stats_and_cleanup() {
    let cache = RequestCache::new(Duration::from_secs(10));
    cache.set("old".to_string(), create_test_response("old"));

    tokio::time::advance(Duration::from_secs(11)).await;
    cache.set("new".to_string(), create_test_response("new"));

    let stats = cache.stats();
    assert_eq!(stats.total_entries, 2);
    assert_eq!(stats.fresh_entries, 1);
    assert_eq!(stats.stale_entries, 1);
    assert!(cache.contains_fresh("new"));
    assert!(!cache.contains_fresh("old"));

    assert_eq!(cache.cleanup(), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_cache_clear() {
    let cache = RequestCache::new(Duration::from_secs(60));
    cache.set("a".to_string(), create_test_response("a"));
    cache.set("b".to_string(), create_test_response("b"));

    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.stats().total_entries, 0);
}

#[test]
fn test_cache_key_ignores_query_insertion_order() {
    let mut first = BTreeMap::new();
    first.insert("page".to_string(), "2".to_string());
    first.insert("q".to_string(), "snake".to_string());

    let mut second = BTreeMap::new();
    second.insert("q".to_string(), "snake".to_string());
    second.insert("page".to_string(), "2".to_string());

    assert_eq!(
        cache_key(HttpMethod::Get, "/search", &first, &RequestBody::Empty),
        cache_key(HttpMethod::Get, "/search", &second, &RequestBody::Empty),
    );
}

#[test]
fn test_cache_key_includes_method() {
    let query = BTreeMap::new();
    assert_ne!(
        cache_key(HttpMethod::Get, "/games", &query, &RequestBody::Empty),
        cache_key(HttpMethod::Head, "/games", &query, &RequestBody::Empty),
    );
}

proptest! {
    #[test]
    fn prop_cache_key_is_deterministic(
        url in "/[a-z0-9/]{0,24}",
        query in proptest::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..4),
        body in proptest::option::of("[ -~]{0,32}"),
    ) {
        let body = body.map(RequestBody::Text).unwrap_or_default();
        let first = cache_key(HttpMethod::Get, &url, &query, &body);
        let second = cache_key(HttpMethod::Get, &url, &query.clone(), &body.clone());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_distinct_bodies_yield_distinct_keys(
        a in "[ -~]{0,32}",
        b in "[ -~]{0,32}",
    ) {
        prop_assume!(a != b);
        let query = BTreeMap::new();
        let key_a = cache_key(HttpMethod::Get, "/games", &query, &RequestBody::Text(a));
        let key_b = cache_key(HttpMethod::Get, "/games", &query, &RequestBody::Text(b));
        prop_assert_ne!(key_a, key_b);
    }

    #[test]
    fn prop_distinct_params_yield_distinct_keys(
        a in proptest::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..4),
        b in proptest::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..4),
    ) {
        prop_assume!(a != b);
        let key_a = cache_key(HttpMethod::Get, "/search", &a, &RequestBody::Empty);
        let key_b = cache_key(HttpMethod::Get, "/search", &b, &RequestBody::Empty);
        prop_assert_ne!(key_a, key_b);
    }
}
