//! FIFO eviction property for the bounded event buffers.

use browser_relay::events::RingBuffer;

#[test]
fn n_plus_one_inserts_evict_the_oldest() {
    let capacity = 5;
    let mut ring = RingBuffer::new(capacity);
    for id in 0..capacity {
        assert!(ring.push(format!("req-{id}")).is_none());
    }
    let evicted = ring.push("req-5".to_string());
    assert_eq!(evicted.as_deref(), Some("req-0"));

    // The evicted id is retrievable-but-absent.
    assert!(ring.find(|id| id == "req-0").is_none());
    assert!(ring.find(|id| id == "req-1").is_some());
    assert_eq!(ring.len(), capacity);
}

#[test]
fn eviction_order_is_strictly_fifo() {
    let mut ring = RingBuffer::new(3);
    let mut evictions = Vec::new();
    for id in 0..10 {
        if let Some(old) = ring.push(id) {
            evictions.push(old);
        }
    }
    assert_eq!(evictions, vec![0, 1, 2, 3, 4, 5, 6]);
    let remaining: Vec<i32> = ring.iter().copied().collect();
    assert_eq!(remaining, vec![7, 8, 9]);
}

#[test]
fn find_mut_updates_in_place() {
    let mut ring = RingBuffer::new(4);
    ring.push(("dl-1", false));
    ring.push(("dl-2", false));
    if let Some(record) = ring.find_mut(|(id, _)| *id == "dl-1") {
        record.1 = true;
    }
    assert_eq!(ring.find(|(id, consumed)| *id == "dl-1" && *consumed).is_some(), true);
    assert!(ring.find(|(id, consumed)| *id == "dl-2" && *consumed).is_none());
}
