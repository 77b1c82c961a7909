//! Fulfillment settlement.
//!
//! Stock, request status and donor credit move together or not at all; the
//! storage adapter applies the [`Settlement`] as one unit and re-checks both
//! the request version and the stock level inside it.

use domains::{BloodRequest, DomainError, DonationRecord, DonorCredit, Result, Settlement, StoreError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::MatchingEngine;

impl MatchingEngine {
    /// Closes a pending request using stock from `bank_id`, crediting the
    /// earliest accepting donor if there is one.
    pub async fn fulfill(&self, request_id: Uuid, bank_id: Uuid) -> Result<BloodRequest> {
        let bank = self.blood_bank(bank_id).await?;
        if !bank.identity.approved {
            return Err(DomainError::Forbidden(format!("blood bank {bank_id} is not approved")));
        }

        for attempt in 1..=self.policy.max_write_attempts {
            let request = self
                .ports
                .requests
                .get(request_id)
                .await?
                .ok_or(DomainError::RequestNotAvailable)?;
            request.ensure_pending()?;

            let available = self.ports.inventory.units_available(bank_id, request.blood_type).await?;
            if available < request.units {
                return Err(DomainError::InsufficientStock { available, required: request.units });
            }

            let now = self.now();
            let mut closed = request.clone();
            let credit = match closed.fulfill(bank_id, now)? {
                Some(donor_id) => self.credit_for(&closed, donor_id, now).await?,
                None => {
                    debug!(request_id = %request_id, "fulfilled without an accepted donor");
                    None
                }
            };

            let settlement = Settlement { request: closed, bank_id, credit };
            match self.ports.settlements.settle(&settlement).await {
                Ok(()) => {
                    let Settlement { mut request, credit, .. } = settlement;
                    request.version += 1;
                    info!(
                        request_id = %request_id,
                        bank_id = %bank_id,
                        units = request.units,
                        credited_donor = ?credit.map(|c| c.donor_id),
                        "blood request fulfilled"
                    );
                    return Ok(request);
                }
                Err(StoreError::VersionConflict(_)) => {
                    debug!(request_id = %request_id, attempt, "settlement raced, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(DomainError::Conflict(format!(
            "request {request_id} kept changing after {} attempts",
            self.policy.max_write_attempts
        )))
    }

    async fn credit_for(
        &self,
        request: &BloodRequest,
        donor_id: Uuid,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<DonorCredit>> {
        match self.donor(donor_id).await {
            Ok(donor) => Ok(Some(DonorCredit {
                donor_id,
                record: DonationRecord {
                    request_id: request.id,
                    hospital_id: request.hospital_id,
                    blood_type: donor.blood_type,
                    donated_at: now,
                },
            })),
            Err(DomainError::NotFound(..)) | Err(DomainError::Validation(_)) => {
                warn!(%donor_id, "credited donor account missing, skipping donation history");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use domains::{
        Account, BloodBank, BloodType, Decision, Identity, MockAccountStore, MockInventoryStore,
        MockNotificationDispatcher, MockRequestRepo, MockSettlementStore, NewBloodRequest, RadiusLadder,
        SystemClock, Urgency,
    };

    use super::*;
    use crate::engine::Ports;
    use crate::policy::MatchingPolicy;

    fn bank(id: Uuid) -> Account {
        Account::BloodBank(BloodBank {
            identity: Identity { id, name: "Central Bank".into(), email: "bank@example.org".into(), approved: true },
            location: None,
            address: None,
        })
    }

    fn request() -> BloodRequest {
        BloodRequest::open(
            NewBloodRequest {
                hospital_id: Uuid::now_v7(),
                blood_type: BloodType::ANeg,
                units: 3,
                urgency: Urgency::Medium,
            },
            &RadiusLadder::default(),
            Utc::now(),
        )
        .unwrap()
    }

    fn engine(
        accounts: MockAccountStore,
        requests: MockRequestRepo,
        inventory: MockInventoryStore,
        settlements: MockSettlementStore,
    ) -> MatchingEngine {
        MatchingEngine::new(
            Ports {
                accounts: Arc::new(accounts),
                requests: Arc::new(requests),
                inventory: Arc::new(inventory),
                settlements: Arc::new(settlements),
                notifier: Arc::new(MockNotificationDispatcher::new()),
                clock: Arc::new(SystemClock),
            },
            MatchingPolicy::default(),
        )
    }

    #[tokio::test]
    async fn short_stock_never_reaches_settlement() {
        let bank_id = Uuid::now_v7();
        let stored = request();
        let id = stored.id;

        let mut accounts = MockAccountStore::new();
        accounts.expect_get_account().returning(move |_| Ok(Some(bank(bank_id))));
        let mut requests = MockRequestRepo::new();
        requests.expect_get().returning(move |_| Ok(Some(stored.clone())));
        let mut inventory = MockInventoryStore::new();
        inventory.expect_units_available().returning(|_, _| Ok(2));
        let mut settlements = MockSettlementStore::new();
        settlements.expect_settle().never();

        let err = engine(accounts, requests, inventory, settlements)
            .fulfill(id, bank_id)
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::InsufficientStock { available: 2, required: 3 });
    }

    #[tokio::test]
    async fn walk_in_fulfillment_carries_no_credit() {
        let bank_id = Uuid::now_v7();
        let mut stored = request();
        stored.record_response(Uuid::now_v7(), Decision::Declined, Utc::now()).unwrap();
        let id = stored.id;

        let mut accounts = MockAccountStore::new();
        accounts.expect_get_account().returning(move |_| Ok(Some(bank(bank_id))));
        let mut requests = MockRequestRepo::new();
        requests.expect_get().returning(move |_| Ok(Some(stored.clone())));
        let mut inventory = MockInventoryStore::new();
        inventory.expect_units_available().returning(|_, _| Ok(10));
        let mut settlements = MockSettlementStore::new();
        settlements
            .expect_settle()
            .times(1)
            .withf(move |s| s.credit.is_none() && s.bank_id == bank_id && s.request.version == 0)
            .returning(|_| Ok(()));

        let closed = engine(accounts, requests, inventory, settlements)
            .fulfill(id, bank_id)
            .await
            .unwrap();
        assert_eq!(closed.fulfilled_by, Some(bank_id));
        assert_eq!(closed.version, 1);
    }

    #[tokio::test]
    async fn backend_failure_surfaces_as_retryable() {
        let bank_id = Uuid::now_v7();
        let stored = request();
        let id = stored.id;

        let mut accounts = MockAccountStore::new();
        accounts.expect_get_account().returning(move |_| Ok(Some(bank(bank_id))));
        let mut requests = MockRequestRepo::new();
        requests.expect_get().returning(move |_| Ok(Some(stored.clone())));
        let mut inventory = MockInventoryStore::new();
        inventory.expect_units_available().returning(|_, _| Ok(10));
        let mut settlements = MockSettlementStore::new();
        settlements
            .expect_settle()
            .returning(|_| Err(StoreError::Backend("connection reset".into())));

        let err = engine(accounts, requests, inventory, settlements)
            .fulfill(id, bank_id)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
