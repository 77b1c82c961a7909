//! Donor response protocol and geofence arrival check.

use domains::{geo, BloodRequest, Decision, DomainError, Result};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::MatchingEngine;
use crate::policy::ceil_days;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArrivalCheck {
    pub arrived: bool,
    pub distance_m: f64,
    pub radius_m: f64,
}

impl MatchingEngine {
    /// Records a donor's accept/decline.
    ///
    /// Checked in order: request pending, cooldown (accepts only),
    /// no earlier response from this donor. Nothing is written on failure.
    pub async fn respond(&self, request_id: Uuid, donor_id: Uuid, decision: Decision) -> Result<BloodRequest> {
        let donor = self.donor(donor_id).await?;
        let now = self.now();
        let cooldown = self.policy.cooldown;

        let (request, ()) = self
            .update_request(
                request_id,
                || DomainError::RequestNotAvailable,
                |r| {
                    r.ensure_pending()?;
                    if decision == Decision::Accepted {
                        if let Some(left) = donor.cooldown_remaining(now, cooldown) {
                            return Err(DomainError::CooldownActive { remaining_days: ceil_days(left) });
                        }
                    }
                    r.record_response(donor_id, decision, now)
                },
            )
            .await?;

        info!(
            request_id = %request_id,
            donor_id = %donor_id,
            ?decision,
            "donor responded"
        );
        Ok(request)
    }

    /// Confirms the donor's last known position lies inside the hospital
    /// geofence. Independent of whether the donor responded.
    pub async fn check_arrival(&self, request_id: Uuid, donor_id: Uuid) -> Result<ArrivalCheck> {
        let donor = self.donor(donor_id).await?;
        let position = donor.location.ok_or(DomainError::LocationUnavailable)?;

        let request = self.request(request_id).await?;
        let hospital = self.hospital(request.hospital_id).await?;
        let fence = hospital.geofence.unwrap_or(domains::Geofence { center: None, radius_m: None });
        let center = fence.center.or(hospital.location).ok_or_else(|| {
            DomainError::Validation(format!("hospital {} has no location", hospital.identity.id))
        })?;
        let radius_m = fence.radius_m.unwrap_or(self.policy.geofence_radius_m);

        let distance_m = geo::distance_m(position, center);
        if distance_m > radius_m {
            return Err(DomainError::OutsideGeofence { distance_m, radius_m });
        }
        info!(request_id = %request_id, donor_id = %donor_id, distance_m, "donor arrived");
        Ok(ArrivalCheck { arrived: true, distance_m, radius_m })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use domains::testing::ManualClock;
    use domains::{
        Account, BloodType, Donor, Identity, MockAccountStore, MockInventoryStore, MockNotificationDispatcher,
        MockRequestRepo, MockSettlementStore, NewBloodRequest, RadiusLadder, Urgency,
    };

    use super::*;
    use crate::engine::Ports;
    use crate::policy::MatchingPolicy;

    fn donor_account(id: Uuid, last_donation_days_ago: Option<i64>, now: chrono::DateTime<Utc>) -> Account {
        Account::Donor(Donor {
            identity: Identity { id, name: "Ravi".into(), email: "ravi@example.org".into(), approved: true },
            blood_type: BloodType::ONeg,
            location: None,
            last_donation_at: last_donation_days_ago.map(|d| now - Duration::days(d)),
            donation_history: vec![],
        })
    }

    fn pending_request(now: chrono::DateTime<Utc>) -> BloodRequest {
        BloodRequest::open(
            NewBloodRequest {
                hospital_id: Uuid::now_v7(),
                blood_type: BloodType::APos,
                units: 1,
                urgency: Urgency::High,
            },
            &RadiusLadder::default(),
            now,
        )
        .unwrap()
    }

    fn engine(accounts: MockAccountStore, requests: MockRequestRepo, now: chrono::DateTime<Utc>) -> MatchingEngine {
        MatchingEngine::new(
            Ports {
                accounts: Arc::new(accounts),
                requests: Arc::new(requests),
                inventory: Arc::new(MockInventoryStore::new()),
                settlements: Arc::new(MockSettlementStore::new()),
                notifier: Arc::new(MockNotificationDispatcher::new()),
                clock: Arc::new(ManualClock::new(now)),
            },
            MatchingPolicy::default(),
        )
    }

    #[tokio::test]
    async fn accept_during_cooldown_records_nothing() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let donor_id = Uuid::now_v7();
        let stored = pending_request(now);
        let id = stored.id;

        let mut accounts = MockAccountStore::new();
        accounts
            .expect_get_account()
            .returning(move |_| Ok(Some(donor_account(donor_id, Some(30), now))));
        let mut requests = MockRequestRepo::new();
        requests.expect_get().returning(move |_| Ok(Some(stored.clone())));
        requests.expect_compare_and_swap().never();

        let err = engine(accounts, requests, now)
            .respond(id, donor_id, Decision::Accepted)
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::CooldownActive { remaining_days: 60 });
    }

    #[tokio::test]
    async fn decline_ignores_cooldown() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let donor_id = Uuid::now_v7();
        let stored = pending_request(now);
        let id = stored.id;

        let mut accounts = MockAccountStore::new();
        accounts
            .expect_get_account()
            .returning(move |_| Ok(Some(donor_account(donor_id, Some(1), now))));
        let mut requests = MockRequestRepo::new();
        requests.expect_get().returning(move |_| Ok(Some(stored.clone())));
        requests
            .expect_compare_and_swap()
            .times(1)
            .withf(move |r| r.responses.len() == 1 && r.timeline.first_accepted_at.is_none())
            .returning(|r| Ok(r.version + 1));

        let request = engine(accounts, requests, now)
            .respond(id, donor_id, Decision::Declined)
            .await
            .unwrap();
        assert_eq!(request.version, 1);
    }

    #[tokio::test]
    async fn missing_request_is_not_available() {
        let now = Utc::now();
        let donor_id = Uuid::now_v7();
        let mut accounts = MockAccountStore::new();
        accounts
            .expect_get_account()
            .returning(move |_| Ok(Some(donor_account(donor_id, None, now))));
        let mut requests = MockRequestRepo::new();
        requests.expect_get().returning(|_| Ok(None));

        let err = engine(accounts, requests, now)
            .respond(Uuid::now_v7(), donor_id, Decision::Accepted)
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::RequestNotAvailable);
    }

    #[tokio::test]
    async fn arrival_without_location_is_unavailable() {
        let now = Utc::now();
        let donor_id = Uuid::now_v7();
        let mut accounts = MockAccountStore::new();
        accounts
            .expect_get_account()
            .returning(move |_| Ok(Some(donor_account(donor_id, None, now))));

        let err = engine(accounts, MockRequestRepo::new(), now)
            .check_arrival(Uuid::now_v7(), donor_id)
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::LocationUnavailable);
    }
}
