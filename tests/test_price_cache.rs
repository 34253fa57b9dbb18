//! Integration tests for the file-backed price cache
//!
//! Tests verify TTL handling, self-healing on corrupted entries, filtered clears and
//! consistency under parallel writers.

use instancepedia_pricing::cache::{cache_key, CacheLookup, PriceCache};
use instancepedia_pricing::types::PriceKind;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn temp_cache(ttl: Duration) -> (tempfile::TempDir, PriceCache) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let cache = PriceCache::new(dir.path(), ttl);
    (dir, cache)
}

fn entry_file(dir: &tempfile::TempDir, region: &str, instance_type: &str, kind: PriceKind) -> std::path::PathBuf {
    dir.path().join(format!("{}.json", cache_key(region, instance_type, kind)))
}

/// `set` then `get` returns exactly what was stored, including a cached "unavailable"
#[test]
fn test_round_trip_including_unavailable() {
    let (_dir, cache) = temp_cache(Duration::from_secs(3600));
    let ri = PriceKind::reserved("1yr", "partial_upfront").unwrap();

    cache.set("us-east-1", "m5.large", PriceKind::OnDemand, Some(0.096));
    cache.set("us-east-1", "m5.large", PriceKind::Spot, Some(0.0351));
    cache.set("us-east-1", "m5.large", ri, None);

    assert_eq!(cache.get("us-east-1", "m5.large", PriceKind::OnDemand), CacheLookup::Hit(Some(0.096)));
    assert_eq!(cache.get("us-east-1", "m5.large", PriceKind::Spot), CacheLookup::Hit(Some(0.0351)));
    assert_eq!(cache.get("us-east-1", "m5.large", ri), CacheLookup::Hit(None));
    // the four price families never share a slot
    assert_eq!(
        cache.get("us-east-1", "m5.large", PriceKind::savings_plan("1yr").unwrap()),
        CacheLookup::Miss
    );
    assert_eq!(cache.stats().total_entries, 3);
}

/// Writing the same fingerprint twice overwrites in place
#[test]
fn test_set_overwrites_in_place() {
    let (_dir, cache) = temp_cache(Duration::from_secs(3600));
    cache.set("eu-west-1", "c5.xlarge", PriceKind::OnDemand, None);
    cache.set("eu-west-1", "c5.xlarge", PriceKind::OnDemand, Some(0.192));

    assert_eq!(cache.get("eu-west-1", "c5.xlarge", PriceKind::OnDemand), CacheLookup::Hit(Some(0.192)));
    assert_eq!(cache.stats().total_entries, 1);
}

/// Fresh cache, one resource: miss, store, hit
#[test]
fn test_fresh_cache_single_resource() {
    let (_dir, cache) = temp_cache(Duration::from_secs(14_400));
    assert_eq!(cache.get("us-east-1", "t3.micro", PriceKind::OnDemand), CacheLookup::Miss);
    cache.set("us-east-1", "t3.micro", PriceKind::OnDemand, Some(0.0104));
    assert_eq!(cache.get("us-east-1", "t3.micro", PriceKind::OnDemand), CacheLookup::Hit(Some(0.0104)));
}

/// Entries past their TTL are a miss and are removed by the read
#[test]
fn test_ttl_expiry_removes_entry() {
    let (dir, cache) = temp_cache(Duration::from_secs(1));
    cache.set("us-east-1", "t3.micro", PriceKind::OnDemand, Some(0.0104));
    assert!(cache.probe("us-east-1", "t3.micro", PriceKind::OnDemand));

    thread::sleep(Duration::from_millis(1100));

    assert!(!cache.probe("us-east-1", "t3.micro", PriceKind::OnDemand));
    assert_eq!(cache.stats().expired_entries, 1, "stats must not expire entries");
    assert_eq!(cache.get("us-east-1", "t3.micro", PriceKind::OnDemand), CacheLookup::Miss);
    assert!(!entry_file(&dir, "us-east-1", "t3.micro", PriceKind::OnDemand).exists());
    assert_eq!(cache.stats().total_entries, 0);
}

/// The TTL is recorded per entry, so caches with different defaults can share a directory
#[test]
fn test_stats_counts_valid_and_expired() {
    let dir = tempfile::tempdir().unwrap();
    let short = PriceCache::new(dir.path(), Duration::from_secs(1));
    let long = PriceCache::new(dir.path(), Duration::from_secs(3600));

    short.set("us-east-1", "t3.nano", PriceKind::OnDemand, Some(0.0052));
    thread::sleep(Duration::from_millis(1100));
    long.set("us-east-1", "t3.small", PriceKind::OnDemand, Some(0.0208));

    let stats = long.stats();
    assert_eq!(stats.total_entries, 2);
    assert_eq!(stats.valid_entries, 1);
    assert_eq!(stats.expired_entries, 1);
    assert!(stats.size_bytes > 0);
    let (oldest, newest) = (stats.oldest_entry.unwrap(), stats.newest_entry.unwrap());
    assert!(oldest < newest);
}

/// Unparseable bytes read as a miss and the entry is deleted
#[test]
fn test_corrupted_entry_self_heals() {
    let (dir, cache) = temp_cache(Duration::from_secs(3600));
    cache.set("ap-south-1", "r5.large", PriceKind::OnDemand, Some(0.128));
    let path = entry_file(&dir, "ap-south-1", "r5.large", PriceKind::OnDemand);
    fs::write(&path, b"{\"timestamp\": 17000").unwrap();

    let stats = cache.stats();
    assert_eq!(stats.total_entries, 1);
    assert_eq!(stats.corrupted_entries, 1);
    assert_eq!(stats.valid_entries, 0);

    assert_eq!(cache.get("ap-south-1", "r5.large", PriceKind::OnDemand), CacheLookup::Miss);
    assert!(!path.exists());

    // slot is usable again
    cache.set("ap-south-1", "r5.large", PriceKind::OnDemand, Some(0.128));
    assert_eq!(cache.get("ap-south-1", "r5.large", PriceKind::OnDemand), CacheLookup::Hit(Some(0.128)));
}

/// `clear(region=A)` removes only A's entries
#[test]
fn test_filtered_clear() {
    let (_dir, cache) = temp_cache(Duration::from_secs(3600));
    cache.set("us-east-1", "t3.micro", PriceKind::OnDemand, Some(0.0104));
    cache.set("us-east-1", "t3.micro", PriceKind::Spot, Some(0.0031));
    cache.set("us-east-1", "m5.large", PriceKind::OnDemand, Some(0.096));
    cache.set("eu-west-1", "t3.micro", PriceKind::OnDemand, Some(0.0114));

    assert_eq!(cache.clear(Some("us-east-1"), None), 3);
    assert_eq!(cache.get("eu-west-1", "t3.micro", PriceKind::OnDemand), CacheLookup::Hit(Some(0.0114)));
    assert_eq!(cache.get("us-east-1", "m5.large", PriceKind::OnDemand), CacheLookup::Miss);
    assert_eq!(cache.stats().total_entries, 1);
}

#[test]
fn test_clear_by_instance_type_and_both_filters() {
    let (_dir, cache) = temp_cache(Duration::from_secs(3600));
    cache.set("us-east-1", "t3.micro", PriceKind::OnDemand, Some(0.0104));
    cache.set("eu-west-1", "t3.micro", PriceKind::OnDemand, Some(0.0114));
    cache.set("eu-west-1", "m5.large", PriceKind::OnDemand, Some(0.107));

    assert_eq!(cache.clear(Some("eu-west-1"), Some("t3.micro")), 1);
    assert_eq!(cache.clear(None, Some("t3.micro")), 1);
    assert_eq!(cache.stats().total_entries, 1);
    assert_eq!(cache.clear(Some("sa-east-1"), None), 0);
}

/// Only an unfiltered clear removes unreadable entries
#[test]
fn test_unfiltered_clear_removes_corrupted_entries() {
    let (dir, cache) = temp_cache(Duration::from_secs(3600));
    cache.set("us-east-1", "t3.micro", PriceKind::OnDemand, Some(0.0104));
    fs::write(dir.path().join("garbage.json"), b"not json").unwrap();
    fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    assert_eq!(cache.clear(Some("us-east-1"), None), 1);
    assert!(dir.path().join("garbage.json").exists());

    assert_eq!(cache.clear(None, None), 1);
    assert!(!dir.path().join("garbage.json").exists());
    // non-entry files are never touched
    assert!(dir.path().join("notes.txt").exists());
}

/// N threads writing the same fingerprint leave exactly one intact entry
#[test]
fn test_concurrent_same_key_writes() {
    let (dir, cache) = temp_cache(Duration::from_secs(3600));
    let cache = Arc::new(cache);
    let prices: Vec<f64> = (1..=16).map(|i| i as f64 * 0.01).collect();

    let handles: Vec<_> = prices
        .iter()
        .map(|&price| {
            let cache = cache.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    cache.set("us-west-2", "c6g.large", PriceKind::Spot, Some(price));
                    // readers never see a torn entry
                    assert!(cache.get("us-west-2", "c6g.large", PriceKind::Spot).is_hit());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread panicked");
    }

    let stats = cache.stats();
    assert_eq!(stats.total_entries, 1);
    assert_eq!(stats.corrupted_entries, 0);
    match cache.get("us-west-2", "c6g.large", PriceKind::Spot) {
        CacheLookup::Hit(Some(price)) => assert!(prices.contains(&price)),
        other => panic!("unexpected lookup: {:?}", other),
    }
    // no temp files left behind
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

/// Identifiers with dots, slashes or separators never collide or escape the directory
#[test]
fn test_awkward_identifiers_stay_distinct() {
    let (dir, cache) = temp_cache(Duration::from_secs(3600));
    cache.set("us-east-1", "t3.micro", PriceKind::OnDemand, Some(1.0));
    cache.set("us-east-1", "t3_micro", PriceKind::OnDemand, Some(2.0));
    cache.set("us-east-1", "../t3+micro", PriceKind::OnDemand, Some(3.0));

    assert_eq!(cache.get("us-east-1", "t3.micro", PriceKind::OnDemand), CacheLookup::Hit(Some(1.0)));
    assert_eq!(cache.get("us-east-1", "t3_micro", PriceKind::OnDemand), CacheLookup::Hit(Some(2.0)));
    assert_eq!(cache.get("us-east-1", "../t3+micro", PriceKind::OnDemand), CacheLookup::Hit(Some(3.0)));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
}
