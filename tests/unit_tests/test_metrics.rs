use std::time::Duration;

use devlease_rs::{metrics::PerfCounters, proto::kind::MessageKind};

#[test]
fn records_success_and_failure() {
    let perf = PerfCounters::new();
    perf.record(MessageKind::Login, Duration::from_micros(100), true);
    perf.record(MessageKind::ReserveRequest, Duration::from_micros(300), true);
    perf.record(MessageKind::ReserveRequest, Duration::from_micros(200), false);

    let snap = perf.snapshot();
    assert_eq!(snap.total, 3);
    assert_eq!(snap.ok, 2);
    assert_eq!(snap.failed, 1);
    assert_eq!(snap.latency_min_us, 100);
    assert_eq!(snap.latency_max_us, 300);
    assert_eq!(snap.latency_avg_us, 200);

    let reserve = snap
        .per_kind
        .iter()
        .find(|k| k.kind == "reserve_request")
        .expect("reserve counter");
    assert_eq!(reserve.count, 2);
}

#[test]
fn empty_snapshot_is_all_zero() {
    let snap = PerfCounters::new().snapshot();
    assert_eq!(snap.total, 0);
    assert_eq!(snap.latency_min_us, 0);
    assert_eq!(snap.latency_max_us, 0);
    assert_eq!(snap.latency_avg_us, 0);
    assert!(snap.per_kind.is_empty());
}

#[test]
fn reset_clears_everything() {
    let perf = PerfCounters::new();
    perf.record(MessageKind::Ping, Duration::from_micros(50), true);
    perf.reset();
    assert_eq!(perf.snapshot().total, 0);
}
