//! Arena LRU list tests.

use std::sync::Arc;

use super::entry::{CacheEntry, EntryStatus};
use super::lru::LruList;
use crate::lineage::LineageItem;
use crate::runtime::{ScalarValue, Value};

fn entry(tag: &str, exec_ms: u64) -> Arc<CacheEntry> {
    CacheEntry::with_value(
        LineageItem::literal(tag),
        Value::Scalar(ScalarValue::F64(1.0)),
        exec_ms * 1_000_000,
        EntryStatus::Cached,
    )
}

fn tail_tags(list: &LruList) -> Vec<String> {
    let mut tags = Vec::new();
    let mut cursor = list.tail();
    while let Some(slot) = cursor {
        tags.push(list.entry(slot).key().data().to_string());
        cursor = list.toward_head(slot);
    }
    tags
}

#[test]
fn test_push_head_orders_by_recency() {
    let mut list = LruList::new();
    list.push_head(entry("a", 1));
    list.push_head(entry("b", 1));
    list.push_head(entry("c", 1));

    assert_eq!(list.len(), 3);
    assert_eq!(tail_tags(&list), vec!["a", "b", "c"]);
}

#[test]
fn test_touch_moves_to_head() {
    let mut list = LruList::new();
    let a = entry("a", 1);
    list.push_head(a.clone());
    list.push_head(entry("b", 1));
    list.push_head(entry("c", 1));

    list.touch(a.lru_pos());
    assert_eq!(tail_tags(&list), vec!["b", "c", "a"]);
}

#[test]
fn test_unlink_middle() {
    let mut list = LruList::new();
    list.push_head(entry("a", 1));
    let b = entry("b", 1);
    list.push_head(b.clone());
    list.push_head(entry("c", 1));

    let removed = list.unlink(b.lru_pos());
    assert_eq!(removed.key().data(), "b");
    assert_eq!(list.len(), 2);
    assert_eq!(tail_tags(&list), vec!["a", "c"]);
}

#[test]
fn test_unlink_endpoints() {
    let mut list = LruList::new();
    let a = entry("a", 1);
    let c = entry("c", 1);
    list.push_head(a.clone());
    list.push_head(entry("b", 1));
    list.push_head(c.clone());

    list.unlink(a.lru_pos());
    list.unlink(c.lru_pos());
    assert_eq!(tail_tags(&list), vec!["b"]);
}

#[test]
fn test_slot_reuse_after_unlink() {
    let mut list = LruList::new();
    let a = entry("a", 1);
    list.push_head(a.clone());
    list.unlink(a.lru_pos());
    list.push_head(entry("b", 1));
    assert_eq!(list.len(), 1);
    assert_eq!(tail_tags(&list), vec!["b"]);
}

#[test]
fn test_scored_insert_orders_low_scores_toward_tail() {
    let mut list = LruList::new();
    let score = |e: &CacheEntry| e.exec_time_ms();

    list.push_scored(entry("mid", 50), 50.0, score);
    list.push_scored(entry("high", 500), 500.0, score);
    list.push_scored(entry("low", 5), 5.0, score);
    list.push_scored(entry("mid2", 60), 60.0, score);

    // Tail to head: ascending score.
    assert_eq!(tail_tags(&list), vec!["low", "mid", "mid2", "high"]);
}

#[test]
fn test_scored_insert_all_equal_behaves_like_push() {
    let mut list = LruList::new();
    let score = |_: &CacheEntry| 1.0;
    list.push_scored(entry("a", 1), 1.0, score);
    list.push_scored(entry("b", 1), 1.0, score);
    list.push_scored(entry("c", 1), 1.0, score);
    assert_eq!(list.len(), 3);
}

#[test]
fn test_clear() {
    let mut list = LruList::new();
    list.push_head(entry("a", 1));
    list.clear();
    assert_eq!(list.len(), 0);
    assert!(list.tail().is_none());
}
