//! Escalation sweeper: grace period, committed requests and shutdown.

use std::time::Duration as StdDuration;

use chrono::Duration;
use domains::{BloodType, Decision};
use integration_tests::{World, DELHI};
use services::{spawn_escalation_sweeper, sweep_once, SweepReport, SweeperConfig};
use tokio_util::sync::CancellationToken;

const GRACE: StdDuration = StdDuration::from_secs(300);

#[tokio::test]
async fn requests_wait_out_the_grace_period() {
    let world = World::new();
    let hospital = world.hospital("City General", DELHI);
    let mid = world.donor_at("Mid", BloodType::BPos, DELHI, 12.0);
    let id = world.open(hospital, BloodType::BPos, 1).await.request.id;

    world.advance(Duration::minutes(4));
    let report = sweep_once(&world.engine, GRACE).await.unwrap();
    assert_eq!(report, SweepReport { examined: 1, skipped_grace: 1, ..Default::default() });
    assert_eq!(world.stored(id).await.search_stage.get(), 1);

    world.advance(Duration::minutes(2));
    let report = sweep_once(&world.engine, GRACE).await.unwrap();
    assert_eq!(report, SweepReport { examined: 1, escalated: 1, notified: 1, ..Default::default() });
    let stored = world.stored(id).await;
    assert_eq!(stored.search_stage.get(), 2);
    assert!(stored.notified_donors.contains(&mid));

    let report = sweep_once(&world.engine, GRACE).await.unwrap();
    assert_eq!(report.escalated, 1);
    assert_eq!(world.stored(id).await.search_stage.get(), 3);

    // Fully widened requests are no longer candidates.
    let report = sweep_once(&world.engine, GRACE).await.unwrap();
    assert_eq!(report, SweepReport::default());
}

#[tokio::test]
async fn committed_and_closed_requests_are_left_alone() {
    let world = World::new();
    let hospital = world.hospital("City General", DELHI);
    let donor = world.donor_at("Ravi", BloodType::ONeg, DELHI, 2.0);
    let bank = world.blood_bank("Red Cross", DELHI);
    world.stock(bank, BloodType::ONeg, 3).await;

    let committed = world.open(hospital, BloodType::ONeg, 1).await.request.id;
    world.engine.respond(committed, donor, Decision::Accepted).await.unwrap();
    let cancelled = world.open(hospital, BloodType::ONeg, 1).await.request.id;
    world.engine.cancel(cancelled, hospital).await.unwrap();
    let fulfilled = world.open(hospital, BloodType::ONeg, 1).await.request.id;
    world.engine.fulfill(fulfilled, bank).await.unwrap();
    let open = world.open(hospital, BloodType::ONeg, 1).await.request.id;

    world.advance(Duration::minutes(30));
    let report = sweep_once(&world.engine, GRACE).await.unwrap();
    assert_eq!(report.examined, 2);
    assert_eq!(report.skipped_committed, 1);
    assert_eq!(report.escalated, 1);

    assert_eq!(world.stored(committed).await.search_stage.get(), 1);
    assert_eq!(world.stored(cancelled).await.search_stage.get(), 1);
    assert_eq!(world.stored(fulfilled).await.search_stage.get(), 1);
    assert_eq!(world.stored(open).await.search_stage.get(), 2);
}

#[tokio::test]
async fn spawned_sweeper_escalates_until_stopped() {
    let world = World::new();
    let hospital = world.hospital("City General", DELHI);
    let id = world.open(hospital, BloodType::AbNeg, 1).await.request.id;
    world.advance(Duration::minutes(1));

    let root = CancellationToken::new();
    let handle = spawn_escalation_sweeper(
        world.engine.clone(),
        SweeperConfig { interval: StdDuration::from_millis(20) },
        root.child_token(),
    );

    let reached_last = tokio::time::timeout(StdDuration::from_secs(5), async {
        loop {
            if world.stored(id).await.search_stage.is_last() {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reached_last.is_ok(), "sweeper never widened the search");

    // Cancelling the parent reaches the sweeper's child token.
    let token = handle.cancellation_token();
    root.cancel();
    assert!(token.is_cancelled());
    tokio::time::timeout(StdDuration::from_secs(5), handle.shutdown())
        .await
        .expect("sweeper did not stop");
}

#[test]
fn sweep_rejects_absurd_intervals() {
    let world = World::new();
    let err = tokio_test::block_on(sweep_once(&world.engine, StdDuration::MAX)).unwrap_err();
    assert!(matches!(err, domains::DomainError::Validation(_)));
}
