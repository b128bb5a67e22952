use std::time::{Duration, Instant};

use arn_network::dedup::SeenEvents;

#[test]
fn test_first_copy_passes_duplicates_dropped() {
    let mut seen = SeenEvents::default();
    assert!(seen.check_and_insert("aa"));
    assert!(!seen.check_and_insert("aa"));
    assert!(seen.check_and_insert("bb"));
    assert_eq!(seen.len(), 2);
}

#[test]
fn test_ids_expire_after_window() {
    let mut seen = SeenEvents::new(Duration::from_secs(60));
    let start = Instant::now();
    assert!(seen.check_and_insert_at("aa", start));
    assert!(!seen.check_and_insert_at("aa", start + Duration::from_secs(59)));
    assert!(seen.check_and_insert_at("aa", start + Duration::from_secs(61)));
}

#[test]
fn test_eviction_keeps_window_bounded() {
    let mut seen = SeenEvents::new(Duration::from_secs(10));
    let start = Instant::now();
    for i in 0..100 {
        seen.check_and_insert_at(&format!("id-{i}"), start);
    }
    assert_eq!(seen.len(), 100);
    seen.check_and_insert_at("late", start + Duration::from_secs(11));
    assert_eq!(seen.len(), 1);
    assert!(!seen.is_empty());
}
