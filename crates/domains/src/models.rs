//! # Domain Models
//!
//! These structs represent the core entities of BloodBridge.
//! Requests carry a `version` used for optimistic concurrency: every
//! persisted mutation bumps it, and writers must present the version they read.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, Result};

/// The eight standard ABO/Rh blood types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BloodType {
    #[serde(rename = "O-")]
    ONeg,
    #[serde(rename = "O+")]
    OPos,
    #[serde(rename = "A-")]
    ANeg,
    #[serde(rename = "A+")]
    APos,
    #[serde(rename = "B-")]
    BNeg,
    #[serde(rename = "B+")]
    BPos,
    #[serde(rename = "AB-")]
    AbNeg,
    #[serde(rename = "AB+")]
    AbPos,
}

impl BloodType {
    pub const ALL: [BloodType; 8] = [
        BloodType::ONeg,
        BloodType::OPos,
        BloodType::ANeg,
        BloodType::APos,
        BloodType::BNeg,
        BloodType::BPos,
        BloodType::AbNeg,
        BloodType::AbPos,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BloodType::ONeg => "O-",
            BloodType::OPos => "O+",
            BloodType::ANeg => "A-",
            BloodType::APos => "A+",
            BloodType::BNeg => "B-",
            BloodType::BPos => "B+",
            BloodType::AbNeg => "AB-",
            BloodType::AbPos => "AB+",
        }
    }

    /// Position in [`BloodType::ALL`]; used as a bit index by the compatibility table.
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BloodType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        BloodType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::Validation(format!("unknown blood type '{s}'")))
    }
}

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// Validated constructor; rejects NaN and out-of-range values.
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(DomainError::Validation(format!(
                "coordinates out of range: ({lat}, {lng})"
            )));
        }
        Ok(Self { lat, lng })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Fulfilled,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Fulfilled => "fulfilled",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "fulfilled" => Ok(RequestStatus::Fulfilled),
            "cancelled" => Ok(RequestStatus::Cancelled),
            other => Err(DomainError::Validation(format!("unknown request status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Accepted,
    Declined,
    /// Reached only from `Accepted`, for the donor credited at fulfillment.
    Completed,
}

/// What a donor may answer. `Completed` is never a donor decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accepted,
    Declined,
}

impl From<Decision> for ResponseStatus {
    fn from(d: Decision) -> Self {
        match d {
            Decision::Accepted => ResponseStatus::Accepted,
            Decision::Declined => ResponseStatus::Declined,
        }
    }
}

/// Escalation stage, always within `1..=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SearchStage(u8);

impl SearchStage {
    pub const FIRST: SearchStage = SearchStage(1);
    pub const LAST: SearchStage = SearchStage(3);

    pub fn get(self) -> u8 {
        self.0
    }

    /// The following stage, or `None` once the ladder is exhausted.
    pub fn next(self) -> Option<SearchStage> {
        (self < Self::LAST).then(|| SearchStage(self.0 + 1))
    }

    pub fn is_last(self) -> bool {
        self == Self::LAST
    }
}

impl TryFrom<u8> for SearchStage {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self> {
        if (Self::FIRST.0..=Self::LAST.0).contains(&value) {
            Ok(SearchStage(value))
        } else {
            Err(DomainError::Validation(format!("search stage {value} outside 1..=3")))
        }
    }
}

impl From<SearchStage> for u8 {
    fn from(stage: SearchStage) -> u8 {
        stage.0
    }
}

/// Search radius per stage, in kilometres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 3]", into = "[f64; 3]")]
pub struct RadiusLadder([f64; 3]);

impl RadiusLadder {
    pub fn new(km: [f64; 3]) -> Result<Self> {
        if km.iter().any(|r| !r.is_finite() || *r <= 0.0) {
            return Err(DomainError::Validation("radius ladder entries must be positive".into()));
        }
        if km.windows(2).any(|w| w[0] >= w[1]) {
            return Err(DomainError::Validation(
                "radius ladder must be strictly increasing".into(),
            ));
        }
        Ok(Self(km))
    }

    pub fn radius_for(&self, stage: SearchStage) -> f64 {
        self.0[usize::from(stage.get() - 1)]
    }
}

impl Default for RadiusLadder {
    fn default() -> Self {
        Self([10.0, 15.0, 20.0])
    }
}

impl TryFrom<[f64; 3]> for RadiusLadder {
    type Error = DomainError;

    fn try_from(km: [f64; 3]) -> Result<Self> {
        RadiusLadder::new(km)
    }
}

impl From<RadiusLadder> for [f64; 3] {
    fn from(ladder: RadiusLadder) -> [f64; 3] {
        ladder.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonorResponse {
    pub donor_id: Uuid,
    pub status: ResponseStatus,
    pub responded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub first_accepted_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Input for opening a new request; validated by [`BloodRequest::open`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBloodRequest {
    pub hospital_id: Uuid,
    pub blood_type: BloodType,
    pub units: u32,
    #[serde(default)]
    pub urgency: Urgency,
}

/// An urgent request for blood raised by a hospital.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloodRequest {
    pub id: Uuid,
    pub hospital_id: Uuid,
    pub blood_type: BloodType,
    pub units: u32,
    pub urgency: Urgency,
    pub status: RequestStatus,
    pub search_stage: SearchStage,
    /// Always `ladder.radius_for(search_stage)`.
    pub search_radius_km: f64,
    /// Insertion order; at most one entry per donor.
    pub responses: Vec<DonorResponse>,
    /// Donors a notification was actually attempted and delivered to.
    pub notified_donors: BTreeSet<Uuid>,
    /// Donors claimed by a dispatch still in flight. Never overlaps
    /// `notified_donors`.
    #[serde(default)]
    pub dispatching: BTreeSet<Uuid>,
    pub timeline: Timeline,
    pub fulfilled_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl BloodRequest {
    /// Opens a request at stage 1.
    pub fn open(input: NewBloodRequest, ladder: &RadiusLadder, now: DateTime<Utc>) -> Result<Self> {
        if input.units == 0 {
            return Err(DomainError::Validation("units must be at least 1".into()));
        }
        Ok(Self {
            id: Uuid::now_v7(),
            hospital_id: input.hospital_id,
            blood_type: input.blood_type,
            units: input.units,
            urgency: input.urgency,
            status: RequestStatus::Pending,
            search_stage: SearchStage::FIRST,
            search_radius_km: ladder.radius_for(SearchStage::FIRST),
            responses: Vec::new(),
            notified_donors: BTreeSet::new(),
            dispatching: BTreeSet::new(),
            timeline: Timeline::default(),
            fulfilled_by: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn ensure_pending(&self) -> Result<()> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(DomainError::RequestNotAvailable)
        }
    }

    pub fn has_accepted(&self) -> bool {
        self.responses.iter().any(|r| r.status == ResponseStatus::Accepted)
    }

    pub fn response_of(&self, donor_id: Uuid) -> Option<&DonorResponse> {
        self.responses.iter().find(|r| r.donor_id == donor_id)
    }

    /// Moves to the next stage and widens the radius.
    ///
    /// Fails without touching the request when it is not pending, when the
    /// ladder is exhausted, or when a donor has already committed.
    pub fn escalate(&mut self, ladder: &RadiusLadder, now: DateTime<Utc>) -> Result<SearchStage> {
        self.ensure_pending()?;
        let next = self.search_stage.next().ok_or(DomainError::EscalationExhausted)?;
        if self.has_accepted() {
            return Err(DomainError::DonorCommitted);
        }
        self.search_stage = next;
        self.search_radius_km = ladder.radius_for(next);
        self.updated_at = now;
        Ok(next)
    }

    /// Appends a donor's answer. Cooldown is the caller's concern since it
    /// needs the donor profile.
    pub fn record_response(&mut self, donor_id: Uuid, decision: Decision, now: DateTime<Utc>) -> Result<()> {
        self.ensure_pending()?;
        if self.response_of(donor_id).is_some() {
            return Err(DomainError::DuplicateResponse);
        }
        self.responses.push(DonorResponse {
            donor_id,
            status: decision.into(),
            responded_at: now,
        });
        if decision == Decision::Accepted && self.timeline.first_accepted_at.is_none() {
            self.timeline.first_accepted_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            RequestStatus::Fulfilled => Err(DomainError::AlreadyFulfilled),
            RequestStatus::Cancelled => Err(DomainError::AlreadyCancelled),
            RequestStatus::Pending => {
                self.status = RequestStatus::Cancelled;
                self.timeline.cancelled_at = Some(now);
                self.updated_at = now;
                Ok(())
            }
        }
    }

    /// Index of the response credited at fulfillment: the earliest
    /// `responded_at` among accepted responses, ties broken by insertion order.
    pub fn credited_response(&self) -> Option<usize> {
        self.responses
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == ResponseStatus::Accepted)
            .min_by_key(|(i, r)| (r.responded_at, *i))
            .map(|(i, _)| i)
    }

    /// Closes the request in favour of `bank_id`, completing the credited
    /// response if any. Returns the credited donor.
    pub fn fulfill(&mut self, bank_id: Uuid, now: DateTime<Utc>) -> Result<Option<Uuid>> {
        self.ensure_pending()?;
        let credited = self.credited_response().map(|i| {
            let response = &mut self.responses[i];
            response.status = ResponseStatus::Completed;
            response.donor_id
        });
        self.status = RequestStatus::Fulfilled;
        self.fulfilled_by = Some(bank_id);
        self.timeline.fulfilled_at = Some(now);
        self.updated_at = now;
        Ok(credited)
    }

    /// Adds donors to the notified set; returns how many were new.
    pub fn mark_notified(&mut self, donors: impl IntoIterator<Item = Uuid>) -> usize {
        donors.into_iter().filter(|d| self.notified_donors.insert(*d)).count()
    }

    /// Claims the donors nobody has notified or is notifying yet, keeping
    /// the caller's order. Only the returned donors may be sent an alert.
    pub fn claim_dispatch(&mut self, candidates: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
        candidates
            .into_iter()
            .filter(|d| !self.notified_donors.contains(d) && self.dispatching.insert(*d))
            .collect()
    }

    /// Releases a finished claim. Delivered donors become notified; the
    /// rest may be claimed again by a later round.
    pub fn finish_dispatch(&mut self, claimed: &[Uuid], delivered: &[Uuid]) -> usize {
        for donor in claimed {
            self.dispatching.remove(donor);
        }
        self.mark_notified(delivered.iter().copied())
    }
}

/// One entry of a donor's append-only donation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationRecord {
    pub request_id: Uuid,
    pub hospital_id: Uuid,
    pub blood_type: BloodType,
    pub donated_at: DateTime<Utc>,
}

/// Fields every account shares regardless of role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub approved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donor {
    #[serde(flatten)]
    pub identity: Identity,
    pub blood_type: BloodType,
    pub location: Option<Coordinates>,
    pub last_donation_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub donation_history: Vec<DonationRecord>,
}

impl Donor {
    /// Time left before the donor may accept again, if any.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>, cooldown: chrono::Duration) -> Option<chrono::Duration> {
        let last = self.last_donation_at?;
        let elapsed = now - last;
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }
}

/// Circular boundary used to confirm a donor has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    /// Falls back to the hospital location when absent.
    pub center: Option<Coordinates>,
    pub radius_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hospital {
    #[serde(flatten)]
    pub identity: Identity,
    pub location: Option<Coordinates>,
    pub geofence: Option<Geofence>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloodBank {
    #[serde(flatten)]
    pub identity: Identity,
    pub location: Option<Coordinates>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Admin {
    #[serde(flatten)]
    pub identity: Identity,
}

/// A user account, one variant per role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Account {
    Donor(Donor),
    Hospital(Hospital),
    BloodBank(BloodBank),
    Admin(Admin),
}

impl Account {
    pub fn identity(&self) -> &Identity {
        match self {
            Account::Donor(d) => &d.identity,
            Account::Hospital(h) => &h.identity,
            Account::BloodBank(b) => &b.identity,
            Account::Admin(a) => &a.identity,
        }
    }

    pub fn id(&self) -> Uuid {
        self.identity().id
    }

    pub fn role(&self) -> &'static str {
        match self {
            Account::Donor(_) => "donor",
            Account::Hospital(_) => "hospital",
            Account::BloodBank(_) => "blood_bank",
            Account::Admin(_) => "admin",
        }
    }

    pub fn into_donor(self) -> Option<Donor> {
        match self {
            Account::Donor(d) => Some(d),
            _ => None,
        }
    }

    pub fn into_hospital(self) -> Option<Hospital> {
        match self {
            Account::Hospital(h) => Some(h),
            _ => None,
        }
    }

    pub fn into_blood_bank(self) -> Option<BloodBank> {
        match self {
            Account::BloodBank(b) => Some(b),
            _ => None,
        }
    }
}

/// Stock held by one blood bank for one blood type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub bank_id: Uuid,
    pub blood_type: BloodType,
    pub units_available: u32,
    pub updated_at: DateTime<Utc>,
}

/// Credit applied to a donor as part of a settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct DonorCredit {
    pub donor_id: Uuid,
    pub record: DonationRecord,
}

/// Everything a fulfillment changes, applied all-or-nothing by a
/// [`crate::ports::SettlementStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    /// The already-transitioned request; its `version` is the one read.
    pub request: BloodRequest,
    pub bank_id: Uuid,
    pub credit: Option<DonorCredit>,
}
