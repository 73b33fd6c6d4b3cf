use std::sync::Arc;

use devlease_rs::{
    cfg::enums::DeviceKind,
    error::ServiceError,
    registry::{
        device::{Device, DeviceRegistry, DeviceStatus},
        reservation::{ExpiryVisit, Reservation, ReservationStatus, ReservationStore},
        session::SessionRegistry,
    },
    sched::{expiry::tick_components, wheel::{TimeWheel, WheelEntry}},
};

const NOW: u64 = 1_700_000_000;

fn setup(capacity: usize) -> (Arc<DeviceRegistry>, Arc<TimeWheel>, ReservationStore) {
    let devices = Arc::new(DeviceRegistry::new());
    devices
        .add(Device::new("DEV001", "Office Laser Printer", DeviceKind::Printer))
        .expect("seed");
    devices
        .add(Device::new("DEV002", "Flatbed Scanner", DeviceKind::Scanner))
        .expect("seed");
    devices
        .add(Device::new("DEV003", "Loaner Laptop", DeviceKind::Laptop))
        .expect("seed");
    devices
        .update_status("DEV003", DeviceStatus::Maintenance, None)
        .expect("maintenance");

    let wheel = Arc::new(TimeWheel::with_size(8));
    let store = ReservationStore::new(capacity, devices.clone(), wheel.clone());
    (devices, wheel, store)
}

fn entry_of(r: &Reservation) -> WheelEntry {
    WheelEntry {
        reservation_id: r.id,
        token: r.sched_token,
        cycle: 0,
    }
}

#[test]
fn create_reserves_device_and_schedules_expiry() {
    let (devices, wheel, store) = setup(16);

    let r = store
        .create("DEV001", "u1", 10, Some("demo".into()), NOW)
        .expect("create");
    assert_eq!(r.id, 1);
    assert_eq!(r.start_time, NOW);
    assert_eq!(r.end_time, NOW + 10);
    assert_eq!(r.status, ReservationStatus::Approved);

    let d = devices.get("DEV001").expect("device");
    assert_eq!(d.status, DeviceStatus::Reserved);
    assert_eq!(d.active_reservation_id, r.id);
    assert_eq!(d.reserved_by, "u1");
    assert_eq!(d.reserved_until, NOW + 10);

    assert_eq!(wheel.pending(), 1);
}

#[test]
fn ids_are_monotonic_from_one() {
    let (_, _, store) = setup(16);
    let a = store.create("DEV001", "u1", 5, None, NOW).expect("create");
    let b = store.create("DEV002", "u1", 5, None, NOW).expect("create");
    assert_eq!((a.id, b.id), (1, 2));
}

#[test]
fn reserved_device_rejects_with_holder_name() {
    let (_, _, store) = setup(16);
    store.create("DEV001", "u1", 100, None, NOW).expect("create");

    let err = store
        .create("DEV001", "u2", 10, None, NOW)
        .expect_err("must conflict");
    match &err {
        ServiceError::ResourceInUse { holder, .. } => assert_eq!(holder, "u1"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.code(), 501);
    assert!(err.to_string().contains("u1"));
}

#[test]
fn maintenance_and_unknown_devices_are_rejected() {
    let (_, _, store) = setup(16);
    assert_eq!(
        store.create("DEV003", "u1", 10, None, NOW).map(|_| ()),
        Err(ServiceError::ResourceMaintenance("DEV003".into()))
    );
    assert_eq!(
        store.create("DEV999", "u1", 10, None, NOW).map(|_| ()),
        Err(ServiceError::ResourceNotFound("DEV999".into()))
    );
}

#[test]
fn non_positive_duration_is_invalid_time() {
    let (_, _, store) = setup(16);
    for bad in [0, -1, -3600] {
        let err = store.create("DEV001", "u1", bad, None, NOW).expect_err("bad");
        assert_eq!(err.code(), 601);
    }
}

#[test]
fn capacity_limit_is_enforced() {
    let (_, _, store) = setup(1);
    store.create("DEV001", "u1", 10, None, NOW).expect("first");
    let err = store
        .create("DEV002", "u2", 10, None, NOW)
        .expect_err("at capacity");
    assert_eq!(err, ServiceError::ReservationLimitReached(1));
}

#[test]
fn foreign_cancel_is_rejected_without_effect() {
    let (devices, _, store) = setup(16);
    let r = store.create("DEV001", "u1", 100, None, NOW).expect("create");

    let err = store.cancel(r.id, "u2").expect_err("not the owner");
    assert_eq!(err.code(), 605);

    let kept = store.get(r.id).expect("still stored");
    assert_eq!(kept.status, ReservationStatus::Approved);
    assert_eq!(
        devices.get("DEV001").map(|d| d.status),
        Some(DeviceStatus::Reserved)
    );
}

#[test]
fn self_cancel_releases_device_but_keeps_record() {
    let (devices, _, store) = setup(16);
    let r = store.create("DEV001", "u1", 100, None, NOW).expect("create");

    let device_id = store.cancel(r.id, "u1").expect("cancel");
    assert_eq!(device_id, "DEV001");

    // Soft delete: device free immediately, record purged by the scheduler.
    let d = devices.get("DEV001").expect("device");
    assert_eq!(d.status, DeviceStatus::Available);
    assert_eq!(d.active_reservation_id, 0);
    assert_eq!(
        store.get(r.id).map(|r| r.status),
        Some(ReservationStatus::Cancelled)
    );

    let second_cancel = store.cancel(r.id, "u1").expect_err("already cancelled");
    assert_eq!(second_cancel.code(), 604);
}

#[test]
fn cancel_for_device_resolves_the_active_reservation() {
    let (_, _, store) = setup(16);
    let r = store.create("DEV001", "u1", 100, None, NOW).expect("create");
    assert_eq!(store.cancel_for_device("DEV001", "u1"), Ok(r.id));
    assert_eq!(
        store.cancel_for_device("DEV001", "u1"),
        Err(ServiceError::ReservationNotFound("DEV001".into()))
    );
}

#[test]
fn visit_purges_cancelled_records() {
    let (_, _, store) = setup(16);
    let r = store.create("DEV001", "u1", 100, None, NOW).expect("create");
    store.cancel(r.id, "u1").expect("cancel");

    assert_eq!(store.expire_visit(&entry_of(&r), NOW), ExpiryVisit::PurgedCancelled);
    assert!(store.get(r.id).is_none());
}

#[test]
fn visit_with_stale_token_is_dropped() {
    let (_, _, store) = setup(16);
    let r = store.create("DEV001", "u1", 100, None, NOW).expect("create");

    let stale = WheelEntry {
        reservation_id: r.id,
        token: r.sched_token + 1,
        cycle: 0,
    };
    assert_eq!(store.expire_visit(&stale, NOW), ExpiryVisit::Gone);
    assert!(store.get(r.id).is_some());
}

#[test]
fn visit_requeues_until_the_final_rotation() {
    let (_, _, store) = setup(16);
    let r = store.create("DEV001", "u1", 20, None, NOW).expect("create");

    let entry = WheelEntry {
        reservation_id: r.id,
        token: r.sched_token,
        cycle: 2,
    };
    assert_eq!(
        store.expire_visit(&entry, NOW + 4),
        ExpiryVisit::Requeue { cycle: 1 }
    );
    // Final cycle but the end has not arrived: one-tick look-ahead.
    assert_eq!(store.expire_visit(&entry_of(&r), NOW + 19), ExpiryVisit::RequeueNear);
}

#[test]
fn visit_completes_expired_reservations() {
    let (devices, _, store) = setup(16);
    let r = store.create("DEV001", "u1", 10, None, NOW).expect("create");

    let visit = store.expire_visit(&entry_of(&r), NOW + 10);
    assert_eq!(
        visit,
        ExpiryVisit::Completed {
            device_id: "DEV001".into()
        }
    );
    assert!(store.get(r.id).is_none());
    assert_eq!(
        devices.get("DEV001").map(|d| d.status),
        Some(DeviceStatus::Available)
    );
}

#[test]
fn tick_completes_a_short_reservation_end_to_end() {
    let (devices, wheel, store) = setup(16);
    let sessions = SessionRegistry::new();
    let r = store.create("DEV001", "u1", 2, None, NOW).expect("create");

    assert!(!tick_components(&wheel, &store, &sessions, 3600, NOW + 1));
    let dirty = tick_components(&wheel, &store, &sessions, 3600, NOW + 2);
    assert!(dirty, "expiry must report a fleet change");
    assert!(store.get(r.id).is_none());
    assert!(devices.is_available("DEV001"));
}

#[test]
fn cancelled_record_purges_within_one_rotation_of_ticks() {
    let (_, wheel, store) = setup(16);
    let sessions = SessionRegistry::new();
    let r = store.create("DEV001", "u1", 5, None, NOW).expect("create");
    store.cancel(r.id, "u1").expect("cancel");

    let mut purged_at = None;
    for tick in 1..=wheel.size() + 1 {
        tick_components(&wheel, &store, &sessions, 3600, NOW + tick as u64);
        if store.get(r.id).is_none() {
            purged_at = Some(tick);
            break;
        }
    }
    assert!(purged_at.is_some(), "cancelled record never purged");
    assert!(purged_at.expect("checked") <= wheel.size() + 1);
}

#[test]
fn only_one_of_two_racing_requests_wins() {
    let (devices, _, store) = setup(16);
    let store = Arc::new(store);

    let mut handles = Vec::new();
    for user in ["u1", "u2", "u3", "u4"] {
        let store = store.clone();
        handles.push(std::thread::spawn(move || {
            store.create("DEV001", user, 10, None, NOW).is_ok()
        }));
    }
    let wins = handles
        .into_iter()
        .map(|h| h.join())
        .filter(|r| matches!(r, Ok(true)))
        .count();

    assert_eq!(wins, 1);
    assert_eq!(
        devices.get("DEV001").map(|d| d.status),
        Some(DeviceStatus::Reserved)
    );
}
