//! # Matching engine
//!
//! Owns the request lifecycle. Every mutating transition is a read,
//! re-validate, compare-and-swap loop against the request's stored version,
//! so concurrent hospital, donor and scheduler calls never both win a race.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use domains::{
    Account, AccountStore, BloodBank, BloodRequest, BloodType, Clock, Coordinates, DomainError, Donor,
    Hospital, InventoryStore, NotificationDispatcher, RequestRepo, Result, SearchStage, SettlementStore,
    StoreError,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::eligibility::{filter_eligible, rank_eligible, EligibilityQuery};
use crate::notifications::{self, AlertKind, AlertMode, DispatchOutcome};
use crate::policy::MatchingPolicy;

/// The collaborators the engine talks to.
#[derive(Clone)]
pub struct Ports {
    pub accounts: Arc<dyn AccountStore>,
    pub requests: Arc<dyn RequestRepo>,
    pub inventory: Arc<dyn InventoryStore>,
    pub settlements: Arc<dyn SettlementStore>,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub clock: Arc<dyn Clock>,
}

pub struct MatchingEngine {
    pub(crate) ports: Ports,
    pub(crate) policy: MatchingPolicy,
    disaster_mode: AtomicBool,
}

/// A transition that also notified donors.
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub request: BloodRequest,
    /// Donors that were notified and are now in `notified_donors`.
    pub delivered: Vec<Uuid>,
    /// Donors whose dispatch failed; eligible again on the next round.
    pub failed: Vec<Uuid>,
}

impl MatchingEngine {
    pub fn new(ports: Ports, policy: MatchingPolicy) -> Self {
        Self {
            ports,
            policy,
            disaster_mode: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> &MatchingPolicy {
        &self.policy
    }

    pub fn alert_mode(&self) -> AlertMode {
        if self.disaster_mode.load(Ordering::Acquire) {
            AlertMode::Disaster
        } else {
            AlertMode::Normal
        }
    }

    pub fn set_alert_mode(&self, mode: AlertMode) {
        self.disaster_mode.store(mode == AlertMode::Disaster, Ordering::Release);
        info!(?mode, "alert mode changed");
    }

    /// Admin-only switch between normal and disaster wording.
    pub async fn switch_alert_mode(&self, admin_id: Uuid, mode: AlertMode) -> Result<AlertMode> {
        match self.account(admin_id).await? {
            Account::Admin(admin) if admin.identity.approved => {
                self.set_alert_mode(mode);
                Ok(mode)
            }
            _ => Err(DomainError::Forbidden(format!("account {admin_id} may not change the alert mode"))),
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.ports.clock.now()
    }

    pub async fn request(&self, id: Uuid) -> Result<BloodRequest> {
        self.ports
            .requests
            .get(id)
            .await?
            .ok_or_else(|| DomainError::NotFound("request", id.to_string()))
    }

    pub(crate) async fn account(&self, id: Uuid) -> Result<Account> {
        self.ports
            .accounts
            .get_account(id)
            .await?
            .ok_or_else(|| DomainError::NotFound("account", id.to_string()))
    }

    pub(crate) async fn donor(&self, id: Uuid) -> Result<Donor> {
        match self.account(id).await {
            Ok(account) => account
                .into_donor()
                .ok_or_else(|| DomainError::Validation(format!("account {id} is not a donor"))),
            Err(DomainError::NotFound(..)) => Err(DomainError::NotFound("donor", id.to_string())),
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn hospital(&self, id: Uuid) -> Result<Hospital> {
        match self.account(id).await {
            Ok(account) => account
                .into_hospital()
                .ok_or_else(|| DomainError::Validation(format!("account {id} is not a hospital"))),
            Err(DomainError::NotFound(..)) => Err(DomainError::NotFound("hospital", id.to_string())),
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn blood_bank(&self, id: Uuid) -> Result<BloodBank> {
        match self.account(id).await {
            Ok(account) => account
                .into_blood_bank()
                .ok_or_else(|| DomainError::Validation(format!("account {id} is not a blood bank"))),
            Err(DomainError::NotFound(..)) => Err(DomainError::NotFound("blood bank", id.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Read-modify-write with optimistic concurrency. `apply` sees the
    /// freshly read request on every attempt and must leave it untouched
    /// when it fails.
    pub(crate) async fn update_request<T>(
        &self,
        id: Uuid,
        missing: impl Fn() -> DomainError,
        mut apply: impl FnMut(&mut BloodRequest) -> Result<T>,
    ) -> Result<(BloodRequest, T)> {
        for attempt in 1..=self.policy.max_write_attempts {
            let mut request = self.ports.requests.get(id).await?.ok_or_else(&missing)?;
            let out = apply(&mut request)?;
            match self.ports.requests.compare_and_swap(&request).await {
                Ok(version) => {
                    request.version = version;
                    return Ok((request, out));
                }
                Err(StoreError::VersionConflict(_)) => {
                    debug!(request_id = %id, attempt, "version conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(DomainError::Conflict(format!(
            "request {id} kept changing after {} attempts",
            self.policy.max_write_attempts
        )))
    }

    /// Eligibility lookup against the account store. Pure apart from the read.
    pub async fn find_eligible_donors(
        &self,
        required: BloodType,
        origin: Coordinates,
        radius_km: f64,
        excluded: &BTreeSet<Uuid>,
    ) -> Result<Vec<Donor>> {
        let query = EligibilityQuery { required, origin, radius_km, excluded };
        query.validate()?;
        let donors = self.ports.accounts.approved_donors().await?;
        Ok(filter_eligible(donors, &query))
    }

    /// Every donor the request could reach at any stage, nearest first.
    pub(crate) async fn reachable_donors(
        &self,
        required: BloodType,
        origin: Coordinates,
    ) -> Result<Vec<(f64, Donor)>> {
        let none = BTreeSet::new();
        let query = EligibilityQuery {
            required,
            origin,
            radius_km: self.policy.ladder.radius_for(SearchStage::LAST),
            excluded: &none,
        };
        query.validate()?;
        let donors = self.ports.accounts.approved_donors().await?;
        Ok(rank_eligible(donors, &query))
    }

    /// Alerts the donors `claimed` in the write that produced `request`,
    /// then releases the claim, recording those that were reached.
    pub(crate) async fn dispatch_claimed(
        &self,
        request: BloodRequest,
        claimed: Vec<Uuid>,
        ranked: &[(f64, Donor)],
        hospital: &Hospital,
        kind: AlertKind,
    ) -> Result<Broadcast> {
        if claimed.is_empty() {
            debug!(request_id = %request.id, radius_km = request.search_radius_km, "no new eligible donors");
            return Ok(Broadcast { request, delivered: vec![], failed: vec![] });
        }

        let mode = self.alert_mode();
        let wanted: BTreeSet<Uuid> = claimed.iter().copied().collect();
        let messages = ranked
            .iter()
            .map(|(_, donor)| donor)
            .filter(|donor| wanted.contains(&donor.identity.id))
            .map(|donor| {
                let message =
                    notifications::compose(kind, mode, &request, hospital, donor, &self.policy.portal_url);
                (donor.identity.id, donor.identity.email.clone(), message)
            })
            .collect();
        let DispatchOutcome { delivered, failed } = notifications::dispatch_all(
            Arc::clone(&self.ports.notifier),
            messages,
            self.policy.dispatch_timeout,
        )
        .await;

        info!(
            request_id = %request.id,
            stage = request.search_stage.get(),
            radius_km = request.search_radius_km,
            delivered = delivered.len(),
            failed = failed.len(),
            "donors notified"
        );

        let recorded = self
            .update_request(
                request.id,
                || DomainError::NotFound("request", request.id.to_string()),
                |r| {
                    // Terminal requests are frozen; late bookkeeping is dropped.
                    r.ensure_pending()?;
                    Ok(r.finish_dispatch(&claimed, &delivered))
                },
            )
            .await;
        match recorded {
            Ok((request, _)) => Ok(Broadcast { request, delivered, failed }),
            Err(DomainError::RequestNotAvailable) => {
                debug!(request_id = %request.id, "request closed during dispatch, notified set left as is");
                let request = self.request(request.id).await?;
                Ok(Broadcast { request, delivered, failed })
            }
            Err(e) => Err(e),
        }
    }
}

/// Claims the ranked donors that lie inside the request's current radius.
pub(crate) fn claim_within_radius(request: &mut BloodRequest, ranked: &[(f64, Donor)]) -> Vec<Uuid> {
    let radius_km = request.search_radius_km;
    request.claim_dispatch(
        ranked
            .iter()
            .take_while(|(km, _)| *km <= radius_km)
            .map(|(_, donor)| donor.identity.id),
    )
}

/// Where a hospital's requests are searched from.
pub(crate) fn hospital_origin(hospital: &Hospital) -> Result<Coordinates> {
    hospital
        .location
        .ok_or_else(|| DomainError::Validation(format!("hospital {} has no location", hospital.identity.id)))
}
