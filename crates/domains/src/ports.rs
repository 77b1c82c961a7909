//! # Core Traits (Ports)
//!
//! Any adapter must implement these traits to be wired into the engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::{DispatchError, StoreError};
use crate::models::{
    Account, BloodBank, BloodRequest, BloodType, Donor, InventoryRecord, RequestStatus, Settlement,
};

/// Read access to user accounts.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// All approved donors, with or without coordinates.
    async fn approved_donors(&self) -> Result<Vec<Donor>, StoreError>;
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, StoreError>;
    async fn approved_blood_banks(&self) -> Result<Vec<BloodBank>, StoreError>;
}

/// Versioned persistence for blood requests.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RequestRepo: Send + Sync {
    async fn insert(&self, request: &BloodRequest) -> Result<(), StoreError>;
    async fn get(&self, id: Uuid) -> Result<Option<BloodRequest>, StoreError>;

    /// Persists `request` only if the stored version still equals
    /// `request.version`. Returns the new version.
    async fn compare_and_swap(&self, request: &BloodRequest) -> Result<u64, StoreError>;

    async fn list_by_status(&self, status: RequestStatus) -> Result<Vec<BloodRequest>, StoreError>;
    async fn list_by_hospital(&self, hospital_id: Uuid) -> Result<Vec<BloodRequest>, StoreError>;
}

/// Blood bank stock, unique per (bank, blood type).
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Zero when the bank holds no record for `blood_type`.
    async fn units_available(&self, bank_id: Uuid, blood_type: BloodType) -> Result<u32, StoreError>;
    async fn upsert(
        &self,
        bank_id: Uuid,
        blood_type: BloodType,
        units: u32,
        now: DateTime<Utc>,
    ) -> Result<InventoryRecord, StoreError>;
    async fn list_for_bank(&self, bank_id: Uuid) -> Result<Vec<InventoryRecord>, StoreError>;
}

/// Applies a fulfillment as one all-or-nothing unit.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Must, atomically:
    /// - fail with `VersionConflict` if the stored request moved past `settlement.request.version`,
    /// - fail with `InsufficientStock` if the bank cannot cover `request.units`,
    /// - otherwise decrement stock, persist the request, and apply the donor credit.
    async fn settle(&self, settlement: &Settlement) -> Result<(), StoreError>;
}

/// Best-effort message delivery to a donor.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DispatchError>;
}

/// Wall-clock source for cooldowns, timeline stamps and grace periods.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
