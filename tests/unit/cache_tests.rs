/*!
 * Tests for the cross-batch translation cache
 *
 * The single-flight property is the load-bearing one: under concurrent
 * registration for the same (source, language) pair, exactly one caller
 * wins ownership and every other caller shares one future.
 */

use std::sync::Arc;

use modtrans::llm::BatchTranslationCache;
use modtrans::llm::cache::{CacheLookup, RegisterOutcome};

#[tokio::test]
async fn test_concurrentRegister_shouldHaveSingleWinner() {
    let cache = Arc::new(BatchTranslationCache::new());
    let key = BatchTranslationCache::hash_key("Hello", "fr");

    let mut handles = Vec::new();
    for i in 0..16 {
        let cache = cache.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            matches!(
                cache.register_pending(&key, &format!("batch-{}", i)),
                RegisterOutcome::Registered
            )
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1, "exactly one concurrent caller may own the key");
}

#[tokio::test]
async fn test_manyWaiters_shouldAllObserveSameTranslation() {
    let cache = Arc::new(BatchTranslationCache::new());
    let key = BatchTranslationCache::hash_key("Hello", "fr");

    assert!(matches!(
        cache.register_pending(&key, "owner"),
        RegisterOutcome::Registered
    ));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let future = match cache.lookup(&key) {
            CacheLookup::Pending(f) => f,
            _ => panic!("expected pending entry"),
        };
        handles.push(tokio::spawn(async move { future.await }));
    }

    cache.complete(&key, "Bonjour");

    for handle in handles {
        assert_eq!(handle.await.unwrap(), Some("Bonjour".to_string()));
    }
}

#[tokio::test]
async fn test_failedOwner_shouldReleaseKeyForRetry() {
    let cache = Arc::new(BatchTranslationCache::new());
    let key = BatchTranslationCache::hash_key("Hello", "fr");

    cache.register_pending(&key, "owner");
    let future = match cache.lookup(&key) {
        CacheLookup::Pending(f) => f,
        _ => panic!("expected pending entry"),
    };

    cache.fail(&key);

    assert_eq!(future.await, None);
    // The key is claimable again after a failure.
    assert!(matches!(
        cache.register_pending(&key, "second-owner"),
        RegisterOutcome::Registered
    ));
}

#[tokio::test]
async fn test_pendingEntry_resolvesExactlyOnce() {
    let cache = Arc::new(BatchTranslationCache::new());
    let key = BatchTranslationCache::hash_key("Hello", "fr");

    cache.register_pending(&key, "owner");
    let future = match cache.lookup(&key) {
        CacheLookup::Pending(f) => f,
        _ => panic!("expected pending entry"),
    };

    cache.complete(&key, "Bonjour");

    // Waiters saw the first completion; the sender is consumed.
    assert_eq!(future.await, Some("Bonjour".to_string()));

    // A late fail must not evict the hit.
    cache.fail(&key);
    assert!(matches!(cache.lookup(&key), CacheLookup::Hit(t) if t == "Bonjour"));
}

#[test]
fn test_hashKey_distinctPairs_shouldNotCollide() {
    let keys = [
        BatchTranslationCache::hash_key("Hello", "fr"),
        BatchTranslationCache::hash_key("Hello", "de"),
        BatchTranslationCache::hash_key("Hello ", "fr"),
        BatchTranslationCache::hash_key("hello", "fr"),
    ];

    for (i, a) in keys.iter().enumerate() {
        for b in keys.iter().skip(i + 1) {
            assert_ne!(a, b);
        }
    }
}
