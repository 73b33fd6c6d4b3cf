use devlease_rs::sched::wheel::{TimeWheel, WheelEntry};

#[test]
fn entry_emerges_after_remaining_seconds() {
    let wheel = TimeWheel::with_size(8);
    wheel.insert(7, 3).expect("insert");

    assert!(wheel.advance().is_empty());
    assert!(wheel.advance().is_empty());
    let bucket = wheel.advance();
    assert_eq!(bucket.len(), 1);
    assert_eq!(bucket[0].reservation_id, 7);
    assert_eq!(bucket[0].cycle, 0);
    assert_eq!(wheel.pending(), 0);
}

#[test]
fn long_expiry_carries_cycles() {
    let wheel = TimeWheel::with_size(8);
    // 10s on an 8-slot wheel: one full rotation plus two ticks.
    let handle = wheel.insert(1, 10).expect("insert");
    assert_eq!(handle.slot, 2);

    wheel.advance();
    let bucket = wheel.advance();
    assert_eq!(bucket.len(), 1);
    assert_eq!(bucket[0].cycle, 1);
}

#[test]
fn requeued_entry_returns_after_full_rotation() {
    let wheel = TimeWheel::with_size(4);
    wheel.insert(1, 1).expect("insert");
    let mut bucket = wheel.advance();
    let entry = bucket.pop().expect("entry");

    wheel.reinsert_current(WheelEntry { cycle: 0, ..entry });
    for _ in 0..3 {
        assert!(wheel.advance().is_empty());
    }
    assert_eq!(wheel.advance().len(), 1);
}

#[test]
fn look_ahead_reinsert_arrives_next_tick() {
    let wheel = TimeWheel::with_size(4);
    wheel.insert(1, 1).expect("insert");
    let mut bucket = wheel.advance();
    let entry = bucket.pop().expect("entry");

    wheel.reinsert_next(entry);
    assert_eq!(wheel.advance().len(), 1);
}

#[test]
fn bucket_drains_lifo() {
    let wheel = TimeWheel::with_size(8);
    wheel.insert(1, 2).expect("insert");
    wheel.insert(2, 2).expect("insert");

    wheel.advance();
    let mut bucket = wheel.advance();
    assert_eq!(bucket.pop().map(|e| e.reservation_id), Some(2));
    assert_eq!(bucket.pop().map(|e| e.reservation_id), Some(1));
}

#[test]
fn zero_remaining_is_rejected() {
    let wheel = TimeWheel::with_size(8);
    assert!(wheel.insert(1, 0).is_err());
}

#[test]
fn tokens_are_unique_and_increasing() {
    let wheel = TimeWheel::with_size(8);
    let a = wheel.insert(1, 1).expect("insert");
    let b = wheel.insert(2, 1).expect("insert");
    assert!(b.token > a.token);
}
