use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use ulid::Ulid;

use super::*;
use crate::store::{AvailabilityStore, DeleteGuard, GuardedDelete};

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 6, 15).unwrap()
}

fn created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 10, 9, 0, 0).unwrap()
}

fn range(start: &str, end: &str) -> TimeRange {
    TimeRange::new(start.parse().unwrap(), end.parse().unwrap()).unwrap()
}

fn new_block(vehicle_id: VehicleId, start: &str, end: &str, kind: BlockKind) -> NewBlock {
    NewBlock {
        vehicle_id,
        date: date(),
        range: range(start, end),
        kind,
        brand_id: None,
        created_by: None,
        notes: Some("pending checkout".into()),
        created_at: created_at(),
    }
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("vehicle_availability_test_ledger");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

#[tokio::test]
async fn overlapping_insert_is_excluded() {
    let ledger = BlockLedger::in_memory();
    let v = Ulid::new();
    let first = ledger
        .insert_block(new_block(v, "10:00", "14:00", BlockKind::Hold))
        .await
        .unwrap();

    let err = ledger
        .insert_block(new_block(v, "13:00", "15:00", BlockKind::Hold))
        .await
        .unwrap_err();
    match err {
        StoreError::Exclusion { conflicting, vehicle_id, .. } => {
            assert_eq!(conflicting, Some(first.id));
            assert_eq!(vehicle_id, v);
        }
        other => panic!("expected exclusion, got {other:?}"),
    }
}

#[tokio::test]
async fn adjacent_and_other_vehicle_inserts_succeed() {
    let ledger = BlockLedger::in_memory();
    let v = Ulid::new();
    ledger
        .insert_block(new_block(v, "10:00", "14:00", BlockKind::Hold))
        .await
        .unwrap();
    ledger
        .insert_block(new_block(v, "14:00", "15:00", BlockKind::Maintenance))
        .await
        .unwrap();
    ledger
        .insert_block(new_block(Ulid::new(), "10:00", "14:00", BlockKind::Hold))
        .await
        .unwrap();

    let mut other_day = new_block(v, "10:00", "14:00", BlockKind::Hold);
    other_day.date = date().succ_opt().unwrap();
    ledger.insert_block(other_day).await.unwrap();
    assert_eq!(ledger.block_count(), 4);
}

#[tokio::test]
async fn expired_hold_still_blocks_insert_until_swept() {
    let ledger = BlockLedger::in_memory();
    let v = Ulid::new();
    ledger
        .insert_block(new_block(v, "10:00", "14:00", BlockKind::Hold))
        .await
        .unwrap();
    let cutoff = created_at() + Duration::minutes(1);

    let visible = ledger
        .find_overlapping(v, date(), range("10:00", "14:00"), cutoff)
        .await
        .unwrap();
    assert!(visible.is_empty());

    let err = ledger
        .insert_block(new_block(v, "10:00", "14:00", BlockKind::Hold))
        .await
        .unwrap_err();
    assert!(err.is_exclusion());

    assert_eq!(ledger.delete_expired_holds(cutoff).await.unwrap(), 1);
    assert_eq!(ledger.delete_expired_holds(cutoff).await.unwrap(), 0);
    ledger
        .insert_block(new_block(v, "10:00", "14:00", BlockKind::Hold))
        .await
        .unwrap();
}

#[tokio::test]
async fn convert_only_touches_holds() {
    let ledger = BlockLedger::in_memory();
    let v = Ulid::new();
    let hold = ledger
        .insert_block(new_block(v, "10:00", "14:00", BlockKind::Hold))
        .await
        .unwrap();
    let booking_id = Ulid::new();

    let converted = ledger.convert_hold(hold.id, booking_id).await.unwrap().unwrap();
    assert_eq!(converted.kind, BlockKind::Booking { booking_id });
    assert_eq!(converted.notes, None);
    assert_eq!(converted.range, hold.range);

    // Already a booking now.
    assert!(ledger.convert_hold(hold.id, Ulid::new()).await.unwrap().is_none());
    assert!(ledger.convert_hold(Ulid::new(), booking_id).await.unwrap().is_none());
    assert_eq!(
        ledger.get_block(hold.id).await.unwrap().unwrap().booking_id(),
        Some(booking_id)
    );
}

#[tokio::test]
async fn delete_booking_blocks_takes_buffers_along() {
    let ledger = BlockLedger::in_memory();
    let v = Ulid::new();
    let booking_id = Ulid::new();
    ledger
        .insert_block(new_block(v, "10:00", "14:00", BlockKind::Booking { booking_id }))
        .await
        .unwrap();
    ledger
        .insert_block(new_block(v, "09:00", "10:00", BlockKind::Buffer { booking_id }))
        .await
        .unwrap();
    let unrelated = ledger
        .insert_block(new_block(v, "15:00", "16:00", BlockKind::Maintenance))
        .await
        .unwrap();

    assert_eq!(ledger.delete_booking_blocks(booking_id).await.unwrap(), 2);
    let left = ledger.vehicle_day_blocks(v, date()).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, unrelated.id);
}

#[tokio::test]
async fn delete_block_returns_removed_row() {
    let ledger = BlockLedger::in_memory();
    let v = Ulid::new();
    let block = ledger
        .insert_block(new_block(v, "10:00", "11:00", BlockKind::Maintenance))
        .await
        .unwrap();
    assert_eq!(ledger.delete_block(block.id).await.unwrap(), Some(block.clone()));
    assert_eq!(ledger.delete_block(block.id).await.unwrap(), None);
    assert_eq!(ledger.get_block(block.id).await.unwrap(), None);
}

#[tokio::test]
async fn range_queries_filter_by_date_and_vehicle() {
    let ledger = BlockLedger::in_memory();
    let a = Ulid::new();
    let b = Ulid::new();
    for (vehicle, offset) in [(a, 0), (a, 1), (b, 1), (a, 5)] {
        let mut nb = new_block(vehicle, "10:00", "11:00", BlockKind::Maintenance);
        nb.date = date() + Duration::days(offset);
        ledger.insert_block(nb).await.unwrap();
    }

    let day2 = date() + Duration::days(1);
    assert_eq!(ledger.day_blocks(day2).await.unwrap().len(), 2);
    assert_eq!(
        ledger
            .blocks_between(date(), day2, None)
            .await
            .unwrap()
            .len(),
        3
    );
    let only_a = ledger
        .blocks_between(date(), date() + Duration::days(5), Some(a))
        .await
        .unwrap();
    assert_eq!(only_a.len(), 3);
    assert!(only_a.windows(2).all(|w| w[0].date <= w[1].date));
}

#[tokio::test]
async fn notes_limit_enforced() {
    let ledger = BlockLedger::in_memory();
    let mut nb = new_block(Ulid::new(), "10:00", "11:00", BlockKind::Hold);
    nb.notes = Some("x".repeat(crate::limits::MAX_NOTES_LEN + 1));
    assert!(matches!(
        ledger.insert_block(nb).await,
        Err(StoreError::LimitExceeded(_))
    ));
}

#[tokio::test]
async fn concurrent_inserts_for_same_slot_admit_exactly_one() {
    let ledger = Arc::new(BlockLedger::in_memory());
    let v = Ulid::new();
    let attempts = (0..32).map(|i| {
        let ledger = ledger.clone();
        let start = if i % 2 == 0 { "10:00" } else { "11:00" };
        tokio::spawn(async move {
            ledger
                .insert_block(new_block(v, start, "13:00", BlockKind::Hold))
                .await
        })
    });
    let results = futures::future::join_all(attempts).await;

    let mut won = 0;
    for r in results {
        match r.unwrap() {
            Ok(_) => won += 1,
            Err(e) => assert!(e.is_exclusion(), "unexpected error: {e}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(ledger.vehicle_day_blocks(v, date()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn subscribers_see_lifecycle_events() {
    let ledger = BlockLedger::in_memory();
    let v = Ulid::new();
    let mut rx = ledger.subscribe(v);

    let hold = ledger
        .insert_block(new_block(v, "10:00", "14:00", BlockKind::Hold))
        .await
        .unwrap();
    let booking_id = Ulid::new();
    ledger.convert_hold(hold.id, booking_id).await.unwrap();
    ledger.delete_booking_blocks(booking_id).await.unwrap();

    assert_eq!(rx.recv().await.unwrap(), BlockEvent::Created(hold.clone()));
    assert!(matches!(
        rx.recv().await.unwrap(),
        BlockEvent::Converted { id, booking_id: b, .. } if id == hold.id && b == booking_id
    ));
    assert!(matches!(rx.recv().await.unwrap(), BlockEvent::Deleted { id, .. } if id == hold.id));
}

#[tokio::test]
async fn wal_replay_restores_state() {
    let path = test_wal_path("replay.wal");
    let v = Ulid::new();
    let booking_id = Ulid::new();
    let (kept, converted) = {
        let ledger = BlockLedger::open(&path).unwrap();
        assert!(ledger.is_durable());
        let kept = ledger
            .insert_block(new_block(v, "08:00", "09:00", BlockKind::Maintenance))
            .await
            .unwrap();
        let hold = ledger
            .insert_block(new_block(v, "10:00", "14:00", BlockKind::Hold))
            .await
            .unwrap();
        let gone = ledger
            .insert_block(new_block(v, "15:00", "16:00", BlockKind::Hold))
            .await
            .unwrap();
        let converted = ledger.convert_hold(hold.id, booking_id).await.unwrap().unwrap();
        ledger.delete_block(gone.id).await.unwrap();
        (kept, converted)
    };

    let reopened = BlockLedger::open(&path).unwrap();
    let blocks = reopened.vehicle_day_blocks(v, date()).await.unwrap();
    assert_eq!(blocks, vec![kept, converted.clone()]);
    assert_eq!(reopened.get_block(converted.id).await.unwrap(), Some(converted));

    // The constraint survives a restart.
    let err = reopened
        .insert_block(new_block(v, "12:00", "13:00", BlockKind::Hold))
        .await
        .unwrap_err();
    assert!(err.is_exclusion());
}

#[tokio::test]
async fn compaction_keeps_live_blocks_only() {
    let path = test_wal_path("compact.wal");
    let v = Ulid::new();
    let survivor = {
        let ledger = BlockLedger::open(&path).unwrap();
        for _ in 0..5 {
            let churn = ledger
                .insert_block(new_block(v, "10:00", "11:00", BlockKind::Hold))
                .await
                .unwrap();
            ledger.delete_block(churn.id).await.unwrap();
        }
        let survivor = ledger
            .insert_block(new_block(v, "12:00", "13:00", BlockKind::Maintenance))
            .await
            .unwrap();
        assert_eq!(ledger.wal_appends_since_compact().await, 11);
        ledger.compact_wal().await.unwrap();
        assert_eq!(ledger.wal_appends_since_compact().await, 0);
        survivor
    };

    let records: Vec<BlockEvent> = crate::wal::Wal::replay(&path).unwrap();
    assert_eq!(records, vec![BlockEvent::Created(survivor.clone())]);
    let reopened = BlockLedger::open(&path).unwrap();
    assert_eq!(reopened.get_block(survivor.id).await.unwrap(), Some(survivor));
}

#[tokio::test]
async fn in_memory_ledger_has_nothing_to_compact() {
    let ledger = BlockLedger::in_memory();
    assert!(!ledger.is_durable());
    ledger.compact_wal().await.unwrap();
    assert_eq!(ledger.wal_appends_since_compact().await, 0);
}

#[tokio::test]
async fn guarded_delete_checks_type_under_the_lock() {
    let ledger = BlockLedger::in_memory();
    let v = Ulid::new();
    let booking_id = Ulid::new();
    let booking = ledger
        .insert_block(new_block(v, "10:00", "12:00", BlockKind::Booking { booking_id }))
        .await
        .unwrap();
    let hold = ledger
        .insert_block(new_block(v, "12:00", "13:00", BlockKind::Hold))
        .await
        .unwrap();

    assert_eq!(
        ledger.delete_block_guarded(booking.id, DeleteGuard::NotBooking).await.unwrap(),
        GuardedDelete::Refused(BlockType::Booking)
    );
    assert_eq!(
        ledger.delete_block_guarded(booking.id, DeleteGuard::HoldOnly).await.unwrap(),
        GuardedDelete::Refused(BlockType::Booking)
    );
    assert_eq!(
        ledger.delete_block_guarded(hold.id, DeleteGuard::HoldOnly).await.unwrap(),
        GuardedDelete::Deleted(hold.clone())
    );
    assert_eq!(
        ledger.delete_block_guarded(hold.id, DeleteGuard::HoldOnly).await.unwrap(),
        GuardedDelete::Missing
    );
    assert_eq!(ledger.block_count(), 1);
}

#[tokio::test]
async fn emptied_days_are_forgotten() {
    let ledger = BlockLedger::in_memory();
    let v = Ulid::new();
    let hold = ledger
        .insert_block(new_block(v, "10:00", "12:00", BlockKind::Hold))
        .await
        .unwrap();
    ledger
        .insert_block(new_block(Ulid::new(), "10:00", "12:00", BlockKind::Hold))
        .await
        .unwrap();
    assert_eq!(ledger.day_count(), 2);

    ledger.delete_block(hold.id).await.unwrap();
    assert_eq!(ledger.day_count(), 1);

    let swept = ledger
        .delete_expired_holds(created_at() + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(swept, 1);
    assert_eq!(ledger.day_count(), 0);
}

#[tokio::test]
async fn cancellation_visits_only_the_booking_days() {
    let ledger = BlockLedger::in_memory();
    let v = Ulid::new();
    let booking_id = Ulid::new();
    ledger
        .insert_block(new_block(v, "10:00", "12:00", BlockKind::Booking { booking_id }))
        .await
        .unwrap();
    let mut next_day = new_block(v, "08:00", "09:00", BlockKind::Buffer { booking_id });
    next_day.date = date() + Duration::days(1);
    ledger.insert_block(next_day).await.unwrap();
    let unrelated = ledger
        .insert_block(new_block(v, "14:00", "15:00", BlockKind::Maintenance))
        .await
        .unwrap();

    let mut days = ledger.days_for_booking(booking_id);
    days.sort();
    assert_eq!(days, [(v, date()), (v, date() + Duration::days(1))]);

    assert_eq!(ledger.delete_booking_blocks(booking_id).await.unwrap(), 2);
    assert!(ledger.days_for_booking(booking_id).is_empty());
    assert_eq!(ledger.day_count(), 1);
    assert!(ledger.get_block(unrelated.id).await.unwrap().is_some());

    // A converted hold joins the index under its new booking.
    let hold = ledger
        .insert_block(new_block(v, "16:00", "17:00", BlockKind::Hold))
        .await
        .unwrap();
    let converted_into = Ulid::new();
    ledger.convert_hold(hold.id, converted_into).await.unwrap();
    assert_eq!(ledger.delete_booking_blocks(converted_into).await.unwrap(), 1);
}

#[tokio::test]
async fn scoped_sweep_leaves_other_days_alone() {
    let ledger = BlockLedger::in_memory();
    let a = Ulid::new();
    let b = Ulid::new();
    for v in [a, b] {
        ledger
            .insert_block(new_block(v, "10:00", "12:00", BlockKind::Hold))
            .await
            .unwrap();
    }
    let cutoff = created_at() + Duration::hours(1);
    assert_eq!(ledger.delete_expired_holds_on(a, date(), cutoff).await.unwrap(), 1);
    assert_eq!(ledger.delete_expired_holds_on(a, date(), cutoff).await.unwrap(), 0);
    assert_eq!(ledger.block_count(), 1);
    assert_eq!(ledger.vehicle_day_blocks(b, date()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn replay_skips_days_left_empty() {
    let path = test_wal_path("replay_empty_days.wal");
    {
        let ledger = BlockLedger::open(&path).unwrap();
        let hold = ledger
            .insert_block(new_block(Ulid::new(), "10:00", "12:00", BlockKind::Hold))
            .await
            .unwrap();
        ledger.delete_block(hold.id).await.unwrap();
    }
    let ledger = BlockLedger::open(&path).unwrap();
    assert_eq!(ledger.block_count(), 0);
    assert_eq!(ledger.day_count(), 0);
}
