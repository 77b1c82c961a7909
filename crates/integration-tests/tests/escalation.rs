//! Radius ladder, notified-set bookkeeping and alert wording.

use std::collections::BTreeSet;
use std::sync::Arc;

use domains::testing::ManualClock;
use domains::{BloodType, Decision, DomainError, MockNotificationDispatcher, NewBloodRequest, Urgency};
use integration_tests::{email_of, epoch, World, DELHI};
use services::{AlertMode, MatchingEngine, MatchingPolicy, Ports};
use storage_adapters::MemoryStore;
use uuid::Uuid;

fn set(ids: &[Uuid]) -> BTreeSet<Uuid> {
    ids.iter().copied().collect()
}

#[tokio::test]
async fn ladder_reaches_new_donors_at_each_stage() {
    let world = World::new();
    let hospital = world.hospital("City General", DELHI);
    let near = world.donor_at("Near", BloodType::ONeg, DELHI, 5.0);
    let mid = world.donor_at("Mid", BloodType::ONeg, DELHI, 12.0);
    let far = world.donor_at("Far", BloodType::ONeg, DELHI, 18.0);
    let beyond = world.donor_at("Beyond", BloodType::ONeg, DELHI, 25.0);

    let opened = world.open(hospital, BloodType::ONeg, 1).await;
    assert_eq!(opened.delivered, vec![near]);
    let id = opened.request.id;

    let second = world.engine.escalate(id).await.unwrap();
    assert_eq!(second.request.search_stage.get(), 2);
    assert_eq!(second.request.search_radius_km, 15.0);
    assert_eq!(second.delivered, vec![mid]);

    let third = world.engine.escalate(id).await.unwrap();
    assert_eq!(third.request.search_stage.get(), 3);
    assert_eq!(third.request.search_radius_km, 20.0);
    assert_eq!(third.delivered, vec![far]);
    assert_eq!(third.request.notified_donors, set(&[near, mid, far]));

    let err = world.engine.escalate(id).await.unwrap_err();
    assert_eq!(err, DomainError::EscalationExhausted);
    let stored = world.stored(id).await;
    assert_eq!(stored.search_stage.get(), 3);
    assert_eq!(stored.search_radius_km, 20.0);

    // Nobody is alerted twice, and the donor past the last radius never is.
    assert_eq!(world.notifier.sent_to(&email_of("Near")).len(), 1);
    assert!(world.notifier.sent_to(&email_of("Beyond")).is_empty());
    assert!(!stored.notified_donors.contains(&beyond));
}

#[tokio::test]
async fn accepted_donor_freezes_the_radius() {
    let world = World::new();
    let hospital = world.hospital("City General", DELHI);
    let donor = world.donor_at("Ravi", BloodType::APos, DELHI, 3.0);

    let id = world.open(hospital, BloodType::APos, 1).await.request.id;
    world.engine.respond(id, donor, Decision::Accepted).await.unwrap();
    let before = world.stored(id).await;

    assert_eq!(world.engine.escalate(id).await.unwrap_err(), DomainError::DonorCommitted);
    assert_eq!(world.stored(id).await, before);
}

#[tokio::test]
async fn declines_do_not_block_escalation() {
    let world = World::new();
    let hospital = world.hospital("City General", DELHI);
    let donor = world.donor_at("Ravi", BloodType::APos, DELHI, 3.0);

    let id = world.open(hospital, BloodType::APos, 1).await.request.id;
    world.engine.respond(id, donor, Decision::Declined).await.unwrap();
    let widened = world.engine.escalate(id).await.unwrap();
    assert_eq!(widened.request.search_stage.get(), 2);
    assert!(widened.delivered.is_empty());
}

#[tokio::test]
async fn escalating_closed_or_unknown_requests_fails() {
    let world = World::new();
    let hospital = world.hospital("City General", DELHI);

    let missing = Uuid::now_v7();
    assert!(matches!(
        world.engine.escalate(missing).await.unwrap_err(),
        DomainError::NotFound("request", _)
    ));

    let id = world.open(hospital, BloodType::BNeg, 1).await.request.id;
    world.engine.cancel(id, hospital).await.unwrap();
    assert_eq!(world.engine.escalate(id).await.unwrap_err(), DomainError::RequestNotAvailable);
    assert_eq!(world.stored(id).await.search_stage.get(), 1);
}

#[tokio::test]
async fn failed_dispatch_is_retried_next_round() {
    let world = World::new();
    let hospital = world.hospital("City General", DELHI);
    let flaky = world.donor_at("Flaky", BloodType::ONeg, DELHI, 4.0);
    let steady = world.donor_at("Steady", BloodType::ONeg, DELHI, 6.0);
    let mid = world.donor_at("Mid", BloodType::ONeg, DELHI, 13.0);
    world.notifier.fail_for(&email_of("Flaky"));

    let opened = world.open(hospital, BloodType::ONeg, 1).await;
    assert_eq!(opened.delivered, vec![steady]);
    assert_eq!(opened.failed, vec![flaky]);
    assert_eq!(opened.request.notified_donors, set(&[steady]));

    world.notifier.recover(&email_of("Flaky"));
    let widened = world.engine.escalate(opened.request.id).await.unwrap();
    assert_eq!(set(&widened.delivered), set(&[flaky, mid]));
    assert!(widened.failed.is_empty());
    assert_eq!(widened.request.notified_donors, set(&[flaky, steady, mid]));
    assert_eq!(world.notifier.sent_to(&email_of("Steady")).len(), 1);
}

#[tokio::test]
async fn only_compatible_approved_located_donors_are_alerted() {
    let world = World::new();
    let hospital = world.hospital("City General", DELHI);
    let universal = world.donor_at("Uma", BloodType::ONeg, DELHI, 1.0);
    let same = world.donor_at("Sam", BloodType::APos, DELHI, 2.0);
    let wrong = world.donor_at("Wes", BloodType::BPos, DELHI, 1.0);
    let unapproved = world.donor_with(
        "Una",
        BloodType::APos,
        Some(domains::geo::offset_north(DELHI, 1.0)),
        None,
        false,
    );
    let nowhere = world.donor_with("Noor", BloodType::APos, None, None, true);

    let opened = world.open(hospital, BloodType::APos, 1).await;
    assert_eq!(opened.delivered, set(&[universal, same]).into_iter().collect::<Vec<_>>());
    for excluded in [wrong, unapproved, nowhere] {
        assert!(!opened.request.notified_donors.contains(&excluded));
    }

    let eligible = world
        .engine
        .find_eligible_donors(BloodType::APos, DELHI, 10.0, &BTreeSet::new())
        .await
        .unwrap();
    assert_eq!(eligible.iter().map(|d| d.identity.id).collect::<Vec<_>>(), vec![universal, same]);

    let err = world
        .engine
        .find_eligible_donors(BloodType::APos, DELHI, 0.0, &BTreeSet::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[tokio::test]
async fn disaster_mode_changes_the_wording() {
    let world = World::new();
    let hospital = world.hospital("City General", DELHI);
    world.donor_at("Near", BloodType::OPos, DELHI, 2.0);
    world.donor_at("Mid", BloodType::OPos, DELHI, 12.0);
    let admin = world.admin("Root");
    let donor = world.donor_at("Nosy", BloodType::AbNeg, DELHI, 30.0);

    assert!(matches!(
        world.engine.switch_alert_mode(donor, AlertMode::Disaster).await.unwrap_err(),
        DomainError::Forbidden(_)
    ));
    assert_eq!(world.engine.alert_mode(), AlertMode::Normal);
    assert_eq!(
        world.engine.switch_alert_mode(admin, AlertMode::Disaster).await.unwrap(),
        AlertMode::Disaster
    );

    let id = world.open(hospital, BloodType::OPos, 2).await.request.id;
    let first = world.notifier.sent_to(&email_of("Near"));
    assert_eq!(first[0].subject, "EMERGENCY BLOOD ALERT - DISASTER MODE");
    assert!(first[0].body.starts_with("DISASTER MODE ACTIVE"));

    world.engine.escalate(id).await.unwrap();
    let widened = world.notifier.sent_to(&email_of("Mid"));
    assert_eq!(widened[0].subject, "EMERGENCY - Blood Search Radius Expanded");

    world.engine.set_alert_mode(AlertMode::Normal);
    world.donor_at("Far", BloodType::OPos, DELHI, 19.0);
    world.engine.escalate(id).await.unwrap();
    let last = world.notifier.sent_to(&email_of("Far"));
    assert_eq!(last[0].subject, "Blood Request Radius Expanded - BloodBridge");
    assert!(last[0].body.contains("within 20 km"));
}

#[tokio::test]
async fn each_reached_donor_gets_exactly_one_send() {
    let world = World::new();
    let hospital = world.hospital("City General", DELHI);
    let donor = world.donor_at("Ravi", BloodType::ONeg, DELHI, 2.0);

    let mut notifier = MockNotificationDispatcher::new();
    notifier
        .expect_send()
        .withf(|to, subject, _| to == "ravi@example.org" && subject == "Urgent Blood Request - BloodBridge")
        .times(1)
        .returning(|_, _, _| Ok(()));

    let store: Arc<MemoryStore> = Arc::clone(&world.store);
    let engine = MatchingEngine::new(
        Ports {
            accounts: store.clone(),
            requests: store.clone(),
            inventory: store.clone(),
            settlements: store,
            notifier: Arc::new(notifier),
            clock: Arc::new(ManualClock::new(epoch())),
        },
        MatchingPolicy::default(),
    );

    let opened = engine
        .create_request(NewBloodRequest {
            hospital_id: hospital,
            blood_type: BloodType::ONeg,
            units: 1,
            urgency: Urgency::Medium,
        })
        .await
        .unwrap();
    assert_eq!(opened.delivered, vec![donor]);

    // Stages 2 and 3 find nobody new, so nothing else is sent.
    for _ in 0..2 {
        let widened = engine.escalate(opened.request.id).await.unwrap();
        assert!(widened.delivered.is_empty() && widened.failed.is_empty());
    }
}
