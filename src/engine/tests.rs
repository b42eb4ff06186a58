use super::*;
use crate::bitmap::{TimeOfDay, TimeWindow};
use std::collections::HashMap;
use std::time::Duration;
use chrono::NaiveDate;
use futures::future::join_all;
use ulid::Ulid;

// ── Helpers ──────────────────────────────────────────────

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("slotkeeper_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_file(path.with_extension("wal.tmp"));
    path
}

fn engine_at(path: PathBuf) -> Engine {
    Engine::new(path, Arc::new(NotifyHub::new()), EngineConfig::default()).unwrap()
}

fn t(h: u16, m: u16) -> TimeOfDay {
    TimeOfDay::hm(h, m)
}

/// Monday.
fn week() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
}

fn tuesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()
}

fn entry(date: NaiveDate, start: TimeOfDay, end: TimeOfDay) -> ScheduleEntry {
    ScheduleEntry {
        date,
        start_time: start,
        end_time: end,
    }
}

fn write(schedule: Vec<ScheduleEntry>, precondition: WritePrecondition) -> WeekWrite {
    WeekWrite {
        week_start: week(),
        clear_existing: true,
        schedule,
        precondition,
    }
}

async fn open_window(engine: &Engine, instructor: Ulid, date: NaiveDate, start: TimeOfDay, end: TimeOfDay) {
    engine
        .write_week(
            instructor,
            WeekWrite {
                week_start: date,
                clear_existing: false,
                schedule: vec![entry(date, start, end)],
                precondition: WritePrecondition::None,
            },
        )
        .await
        .unwrap();
}

fn request(student: Ulid, instructor: Ulid, date: NaiveDate, start: TimeOfDay, end: TimeOfDay) -> ReservationRequest {
    ReservationRequest {
        student_id: student,
        instructor_id: instructor,
        instructor_service_id: None,
        booking_date: date,
        start_time: start,
        end_time: end,
    }
}

// ── Reservations ─────────────────────────────────────────

#[tokio::test]
async fn reserve_inside_early_morning_window() {
    let engine = engine_at(test_wal_path("early_morning.wal"));
    let instructor = Ulid::new();
    open_window(&engine, instructor, tuesday(), t(1, 0), t(3, 0)).await;

    let booking = engine
        .reserve(request(Ulid::new(), instructor, tuesday(), t(1, 0), t(2, 0)))
        .await
        .unwrap();
    assert_eq!(booking.booking_date, tuesday());
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(engine.get_booking(booking.id).unwrap(), booking);
}

#[tokio::test]
async fn early_morning_window_holds_for_zone_west_of_utc() {
    let path = test_wal_path("early_morning_tz.wal");
    let instructor = Ulid::new();
    let config = EngineConfig {
        timezones: Arc::new(StaticTimezones::new(
            "UTC",
            HashMap::from([(instructor, "America/New_York".to_string())]),
        )),
        ..EngineConfig::default()
    };
    let engine = Engine::new(path, Arc::new(NotifyHub::new()), config).unwrap();
    open_window(&engine, instructor, tuesday(), t(1, 0), t(3, 0)).await;

    let booking = engine
        .reserve(request(Ulid::new(), instructor, tuesday(), t(1, 0), t(2, 0)))
        .await
        .unwrap();
    assert_eq!(booking.booking_date, tuesday());
}

#[tokio::test]
async fn empty_day_is_not_available() {
    let engine = engine_at(test_wal_path("empty_day.wal"));
    let err = engine
        .reserve(request(Ulid::new(), Ulid::new(), tuesday(), t(9, 0), t(10, 0)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotAvailable));
    assert_eq!(engine.booking_count(), 0);
}

#[tokio::test]
async fn partially_covered_request_is_not_available() {
    let engine = engine_at(test_wal_path("partial.wal"));
    let instructor = Ulid::new();
    open_window(&engine, instructor, tuesday(), t(9, 0), t(10, 0)).await;
    let err = engine
        .reserve(request(Ulid::new(), instructor, tuesday(), t(9, 30), t(10, 30)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotAvailable));
}

#[tokio::test]
async fn inverted_request_is_invalid() {
    let engine = engine_at(test_wal_path("inverted.wal"));
    let err = engine
        .reserve(request(Ulid::new(), Ulid::new(), tuesday(), t(10, 0), t(9, 0)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidWindow(_)));
}

#[tokio::test]
async fn window_ending_at_midnight_books_on_start_date() {
    let engine = engine_at(test_wal_path("midnight.wal"));
    let instructor = Ulid::new();
    open_window(&engine, instructor, tuesday(), t(22, 0), TimeOfDay::MIDNIGHT).await;

    let booking = engine
        .reserve(request(Ulid::new(), instructor, tuesday(), t(23, 0), TimeOfDay::MIDNIGHT))
        .await
        .unwrap();
    assert_eq!(booking.booking_date, tuesday());
    assert_eq!(booking.end_time, TimeOfDay::END_OF_DAY);
}

#[tokio::test]
async fn overlapping_reservation_conflicts() {
    let engine = engine_at(test_wal_path("overlap.wal"));
    let instructor = Ulid::new();
    open_window(&engine, instructor, tuesday(), t(12, 0), t(18, 0)).await;

    let first = engine
        .reserve(request(Ulid::new(), instructor, tuesday(), t(15, 0), t(16, 0)))
        .await
        .unwrap();
    let err = engine
        .reserve(request(Ulid::new(), instructor, tuesday(), t(15, 30), t(16, 30)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(id) if id == first.id));

    // Touching spans do not overlap.
    engine
        .reserve(request(Ulid::new(), instructor, tuesday(), t(16, 0), t(17, 0)))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_same_span_has_one_winner() {
    let engine = Arc::new(engine_at(test_wal_path("race_instructor.wal")));
    let instructor = Ulid::new();
    open_window(&engine, instructor, tuesday(), t(12, 0), t(18, 0)).await;

    let attempts = (0..16).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .reserve(request(Ulid::new(), instructor, tuesday(), t(15, 0), t(16, 0)))
                .await
        })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, EngineError::Conflict(_)))
    );
    assert_eq!(engine.bookings_for_instructor(instructor, tuesday()).len(), 1);
    assert_eq!(engine.live_lock_keys(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn student_cannot_double_book_across_instructors() {
    let engine = Arc::new(engine_at(test_wal_path("race_student.wal")));
    let student = Ulid::new();
    let instructors: Vec<Ulid> = (0..6).map(|_| Ulid::new()).collect();
    for instructor in &instructors {
        open_window(&engine, *instructor, tuesday(), t(15, 0), t(16, 0)).await;
    }

    let attempts = instructors.iter().map(|instructor| {
        let engine = engine.clone();
        let instructor = *instructor;
        tokio::spawn(async move {
            engine
                .reserve(request(student, instructor, tuesday(), t(15, 0), t(16, 0)))
                .await
        })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(engine.bookings_for_student(student, tuesday()).len(), 1);
}

#[tokio::test]
async fn cancel_frees_span() {
    let engine = engine_at(test_wal_path("cancel.wal"));
    let instructor = Ulid::new();
    open_window(&engine, instructor, tuesday(), t(15, 0), t(16, 0)).await;

    let first = engine
        .reserve(request(Ulid::new(), instructor, tuesday(), t(15, 0), t(16, 0)))
        .await
        .unwrap();
    let cancelled = engine.cancel_booking(first.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    let second = engine
        .reserve(request(Ulid::new(), instructor, tuesday(), t(15, 0), t(16, 0)))
        .await
        .unwrap();
    assert_ne!(first.id, second.id);

    let rows = engine.bookings_for_instructor(instructor, tuesday());
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn repeated_cancellations_keep_span_bookable() {
    let engine = engine_at(test_wal_path("cancel_cycles.wal"));
    let instructor = Ulid::new();
    let student = Ulid::new();
    open_window(&engine, instructor, tuesday(), t(15, 0), t(16, 0)).await;

    let cycles = crate::limits::MAX_BOOKINGS_PER_DAY + 8;
    for _ in 0..cycles {
        let booking = engine
            .reserve(request(student, instructor, tuesday(), t(15, 0), t(16, 0)))
            .await
            .unwrap();
        engine.cancel_booking(booking.id).await.unwrap();
    }

    let last = engine
        .reserve(request(student, instructor, tuesday(), t(15, 0), t(16, 0)))
        .await
        .unwrap();
    assert_eq!(last.status, BookingStatus::Pending);
    assert_eq!(engine.bookings_for_instructor(instructor, tuesday()).len(), cycles + 1);
}

#[tokio::test]
async fn failed_wal_append_leaves_no_booking_and_frees_keys() {
    let engine = engine_at(test_wal_path("wal_failure.wal"));
    let instructor = Ulid::new();
    let student = Ulid::new();
    open_window(&engine, instructor, tuesday(), t(15, 0), t(16, 0)).await;

    engine.set_wal_failing(true).await;
    let err = engine
        .reserve(request(student, instructor, tuesday(), t(15, 0), t(16, 0)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WalError(_)), "got {err:?}");
    assert!(engine.bookings_for_instructor(instructor, tuesday()).is_empty());
    assert!(engine.bookings_for_student(student, tuesday()).is_empty());
    assert_eq!(engine.booking_count(), 0);
    assert_eq!(engine.live_lock_keys(), 0);

    engine.set_wal_failing(false).await;
    let booking = engine
        .reserve(request(student, instructor, tuesday(), t(15, 0), t(16, 0)))
        .await
        .unwrap();
    assert_eq!(engine.bookings_for_instructor(instructor, tuesday()), vec![booking]);
    assert_eq!(engine.live_lock_keys(), 0);
}

#[tokio::test]
async fn lifecycle_transitions() {
    let engine = engine_at(test_wal_path("lifecycle.wal"));
    let instructor = Ulid::new();
    open_window(&engine, instructor, tuesday(), t(9, 0), t(12, 0)).await;
    let booking = engine
        .reserve(request(Ulid::new(), instructor, tuesday(), t(9, 0), t(10, 0)))
        .await
        .unwrap();

    let err = engine
        .transition_booking(booking.id, BookingStatus::Completed)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            from: BookingStatus::Pending,
            to: BookingStatus::Completed
        }
    ));

    let confirmed = engine
        .transition_booking(booking.id, BookingStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    let completed = engine
        .transition_booking(booking.id, BookingStatus::Completed)
        .await
        .unwrap();
    assert_eq!(completed.status, BookingStatus::Completed);

    // Only pending and confirmed bookings occupy time.
    engine
        .reserve(request(Ulid::new(), instructor, tuesday(), t(9, 0), t(10, 0)))
        .await
        .unwrap();

    let err = engine.cancel_booking(booking.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
}

#[tokio::test]
async fn unknown_booking_is_not_found() {
    let engine = engine_at(test_wal_path("not_found.wal"));
    let id = Ulid::new();
    assert!(matches!(engine.get_booking(id), Err(EngineError::NotFound(x)) if x == id));
    assert!(matches!(
        engine.cancel_booking(id).await,
        Err(EngineError::NotFound(x)) if x == id
    ));
}

#[tokio::test]
async fn held_key_times_out_busy() {
    let path = test_wal_path("busy.wal");
    let config = EngineConfig {
        lock_wait: Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let engine = Engine::new(path, Arc::new(NotifyHub::new()), config).unwrap();
    let instructor = Ulid::new();
    open_window(&engine, instructor, tuesday(), t(9, 0), t(12, 0)).await;

    let held = engine
        .locks
        .acquire_all(&[LockKey::Instructor(instructor, tuesday())], Duration::from_secs(1))
        .await
        .unwrap();
    let err = engine
        .reserve(request(Ulid::new(), instructor, tuesday(), t(9, 0), t(10, 0)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Busy));
    assert!(err.is_retryable());
    assert_eq!(engine.booking_count(), 0);

    drop(held);
    engine
        .reserve(request(Ulid::new(), instructor, tuesday(), t(9, 0), t(10, 0)))
        .await
        .unwrap();
}

#[tokio::test]
async fn other_instructor_day_does_not_wait() {
    let path = test_wal_path("independent_keys.wal");
    let config = EngineConfig {
        lock_wait: Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let engine = Engine::new(path, Arc::new(NotifyHub::new()), config).unwrap();
    let instructor = Ulid::new();
    let wednesday = tuesday().succ_opt().unwrap();
    open_window(&engine, instructor, wednesday, t(9, 0), t(12, 0)).await;

    let _held = engine
        .locks
        .acquire_all(&[LockKey::Instructor(instructor, tuesday())], Duration::from_secs(1))
        .await
        .unwrap();
    engine
        .reserve(request(Ulid::new(), instructor, wednesday, t(9, 0), t(10, 0)))
        .await
        .unwrap();
}

// ── Week controller ──────────────────────────────────────

#[tokio::test]
async fn if_match_write_advances_etag() {
    let engine = engine_at(test_wal_path("etag_flow.wal"));
    let instructor = Ulid::new();

    let e1 = engine.read_week(instructor, week()).await;
    assert_eq!(e1.version, 0);
    assert_eq!(e1.days.len(), 7);
    assert!(e1.days.values().all(Vec::is_empty));

    let e2 = engine
        .write_week(
            instructor,
            write(
                vec![entry(tuesday(), t(1, 0), t(3, 0))],
                WritePrecondition::IfMatch(e1.etag.clone()),
            ),
        )
        .await
        .unwrap();
    assert_ne!(e2.etag, e1.etag);
    assert_eq!(e2.version, 1);

    let read = engine.read_week(instructor, tuesday()).await;
    assert_eq!(read.etag, e2.etag);
    assert_eq!(read.week_start, week());
    assert_eq!(read.days[&tuesday()], vec![TimeWindow::new(t(1, 0), t(3, 0))]);
    assert!(read.last_modified.is_some());
}

#[tokio::test]
async fn stale_if_match_is_rejected_without_mutation() {
    let engine = engine_at(test_wal_path("etag_stale.wal"));
    let instructor = Ulid::new();
    let e1 = engine.read_week(instructor, week()).await.etag;

    let e2 = engine
        .write_week(
            instructor,
            write(
                vec![entry(tuesday(), t(1, 0), t(3, 0))],
                WritePrecondition::IfMatch(e1.clone()),
            ),
        )
        .await
        .unwrap()
        .etag;

    let err = engine
        .write_week(
            instructor,
            write(
                vec![entry(tuesday(), t(9, 0), t(10, 0))],
                WritePrecondition::IfMatch(e1),
            ),
        )
        .await
        .unwrap_err();
    match err {
        EngineError::VersionConflict { current_etag } => assert_eq!(current_etag, e2),
        other => panic!("expected version conflict, got {other:?}"),
    }

    let read = engine.read_week(instructor, week()).await;
    assert_eq!(read.etag, e2);
    assert_eq!(read.days[&tuesday()], vec![TimeWindow::new(t(1, 0), t(3, 0))]);
}

#[tokio::test]
async fn override_ignores_stale_token() {
    let engine = engine_at(test_wal_path("etag_override.wal"));
    let instructor = Ulid::new();
    let e1 = engine.read_week(instructor, week()).await.etag;
    engine
        .write_week(instructor, write(vec![entry(tuesday(), t(1, 0), t(3, 0))], WritePrecondition::None))
        .await
        .unwrap();

    let mut forced = write(vec![entry(tuesday(), t(9, 0), t(10, 0))], WritePrecondition::Override);
    forced.schedule.push(entry(week(), t(8, 0), t(9, 0)));
    let view = engine.write_week(instructor, forced).await.unwrap();
    assert_eq!(view.version, 2);
    assert_eq!(view.days[&tuesday()], vec![TimeWindow::new(t(9, 0), t(10, 0))]);
    assert_ne!(view.etag, e1);
}

#[tokio::test]
async fn version_advances_even_for_identical_content() {
    let engine = engine_at(test_wal_path("version_monotonic.wal"));
    let instructor = Ulid::new();
    let mut seen = Vec::new();
    for _ in 0..4 {
        let view = engine
            .write_week(instructor, write(vec![entry(tuesday(), t(9, 0), t(10, 0))], WritePrecondition::None))
            .await
            .unwrap();
        seen.push((view.version, view.etag));
    }
    assert_eq!(seen.iter().map(|(v, _)| *v).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    for pair in seen.windows(2) {
        assert_ne!(pair[0].1, pair[1].1);
    }
}

#[tokio::test]
async fn merge_write_keeps_existing_windows() {
    let engine = engine_at(test_wal_path("merge.wal"));
    let instructor = Ulid::new();
    open_window(&engine, instructor, tuesday(), t(9, 0), t(10, 0)).await;
    open_window(&engine, instructor, tuesday(), t(14, 0), t(15, 0)).await;

    let read = engine.read_week(instructor, week()).await;
    assert_eq!(
        read.days[&tuesday()],
        vec![TimeWindow::new(t(9, 0), t(10, 0)), TimeWindow::new(t(14, 0), t(15, 0))]
    );

    // Replacing one day leaves the others alone.
    engine
        .write_week(instructor, write(vec![entry(week(), t(7, 0), t(8, 0))], WritePrecondition::None))
        .await
        .unwrap();
    let read = engine.read_week(instructor, week()).await;
    assert_eq!(read.days[&week()], vec![TimeWindow::new(t(7, 0), t(8, 0))]);
    assert_eq!(read.days[&tuesday()].len(), 2);
}

#[tokio::test]
async fn concurrent_if_match_writes_have_one_winner() {
    let engine = Arc::new(engine_at(test_wal_path("etag_race.wal")));
    let instructor = Ulid::new();
    let e1 = engine.read_week(instructor, week()).await.etag;

    let attempts = (0..8u16).map(|i| {
        let engine = engine.clone();
        let token = e1.clone();
        tokio::spawn(async move {
            engine
                .write_week(
                    instructor,
                    write(
                        vec![entry(tuesday(), t(i, 0), t(i + 1, 0))],
                        WritePrecondition::IfMatch(token),
                    ),
                )
                .await
        })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(engine.read_week(instructor, week()).await.version, 1);
}

#[tokio::test]
async fn week_write_outside_week_rejected() {
    let engine = engine_at(test_wal_path("outside_week.wal"));
    let next_monday = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
    let err = engine
        .write_week(Ulid::new(), write(vec![entry(next_monday, t(9, 0), t(10, 0))], WritePrecondition::None))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DateOutsideWeek { .. }));
}

#[tokio::test]
async fn week_update_publishes_event() {
    let engine = engine_at(test_wal_path("notify_week.wal"));
    let instructor = Ulid::new();
    let mut rx = engine.notify.subscribe(instructor);

    open_window(&engine, instructor, tuesday(), t(9, 0), t(10, 0)).await;
    let booking = engine
        .reserve(request(Ulid::new(), instructor, tuesday(), t(9, 0), t(10, 0)))
        .await
        .unwrap();

    match rx.recv().await.unwrap() {
        Event::WeekUpserted { version, week_start, .. } => {
            assert_eq!(version, 1);
            assert_eq!(week_start, week());
        }
        other => panic!("unexpected {other:?}"),
    }
    match rx.recv().await.unwrap() {
        Event::BookingCreated { booking: got } => assert_eq!(got, booking),
        other => panic!("unexpected {other:?}"),
    }
}

// ── Persistence ──────────────────────────────────────────

#[tokio::test]
async fn state_survives_restart() {
    let path = test_wal_path("restart.wal");
    let instructor = Ulid::new();
    let (etag, booking_id) = {
        let engine = engine_at(path.clone());
        open_window(&engine, instructor, tuesday(), t(9, 0), t(12, 0)).await;
        let booking = engine
            .reserve(request(Ulid::new(), instructor, tuesday(), t(9, 0), t(10, 0)))
            .await
            .unwrap();
        engine
            .transition_booking(booking.id, BookingStatus::Confirmed)
            .await
            .unwrap();
        (engine.read_week(instructor, week()).await.etag, booking.id)
    };

    let engine = engine_at(path);
    let view = engine.read_week(instructor, week()).await;
    assert_eq!(view.etag, etag);
    assert_eq!(engine.get_booking(booking_id).unwrap().status, BookingStatus::Confirmed);

    let err = engine
        .reserve(request(Ulid::new(), instructor, tuesday(), t(9, 30), t(10, 30)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(id) if id == booking_id));
}

#[tokio::test]
async fn compaction_preserves_state() {
    let path = test_wal_path("compact.wal");
    let instructor = Ulid::new();
    let (etag, kept, cancelled) = {
        let engine = engine_at(path.clone());
        for hour in 8..12 {
            engine
                .write_week(
                    instructor,
                    write(vec![entry(tuesday(), t(hour, 0), t(18, 0))], WritePrecondition::None),
                )
                .await
                .unwrap();
        }
        let kept = engine
            .reserve(request(Ulid::new(), instructor, tuesday(), t(12, 0), t(13, 0)))
            .await
            .unwrap();
        let cancelled = engine
            .reserve(request(Ulid::new(), instructor, tuesday(), t(14, 0), t(15, 0)))
            .await
            .unwrap();
        engine.cancel_booking(cancelled.id).await.unwrap();

        assert_eq!(engine.wal_appends_since_compact().await, 7);
        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        (engine.read_week(instructor, week()).await.etag, kept.id, cancelled.id)
    };

    let events = crate::wal::Wal::replay(&path).unwrap();
    assert_eq!(events.len(), 3);

    let engine = engine_at(path);
    let view = engine.read_week(instructor, week()).await;
    assert_eq!(view.version, 4);
    assert_eq!(view.etag, etag);
    assert_eq!(engine.get_booking(kept).unwrap().status, BookingStatus::Pending);
    assert_eq!(engine.get_booking(cancelled).unwrap().status, BookingStatus::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn compaction_keeps_concurrent_commits() {
    let path = test_wal_path("compact_race.wal");
    let instructor = Ulid::new();
    let ids = {
        let engine = Arc::new(engine_at(path.clone()));
        open_window(&engine, instructor, tuesday(), TimeOfDay::MIDNIGHT, TimeOfDay::END_OF_DAY).await;

        let reservations = (0..24u16).map(|hour| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .reserve(request(Ulid::new(), instructor, tuesday(), t(hour, 0), t(hour, 30)))
                    .await
            })
        });
        let compactor = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.compact_wal().await })
        };
        let results = join_all(reservations).await;
        compactor.await.unwrap().unwrap();

        results
            .into_iter()
            .map(|r| r.unwrap().unwrap().id)
            .collect::<Vec<_>>()
    };

    let engine = engine_at(path);
    for id in ids {
        assert!(engine.get_booking(id).is_ok(), "booking {id} lost by compaction");
    }
    assert_eq!(engine.bookings_for_instructor(instructor, tuesday()).len(), 24);
}
