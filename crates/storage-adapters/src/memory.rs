//! # In-memory store
//!
//! Implements every storage port on top of `DashMap`. A request's shard
//! lock is held for the whole compare-and-swap or settlement, so a reader
//! sees either the state before a transition or after it, never in between.
//!
//! Settlement takes locks in a fixed order (request, inventory, account);
//! every other path holds at most one guard at a time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domains::{
    Account, AccountStore, BloodBank, BloodRequest, BloodType, Donor, InventoryRecord, InventoryStore,
    RequestRepo, RequestStatus, Settlement, SettlementStore, StoreError,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    accounts: DashMap<Uuid, Account>,
    requests: DashMap<Uuid, BloodRequest>,
    inventory: DashMap<(Uuid, BloodType), InventoryRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an account. Account management lives outside the
    /// engine; this is how it gets its data in.
    pub fn put_account(&self, account: Account) {
        self.accounts.insert(account.id(), account);
    }

    pub fn account(&self, id: Uuid) -> Option<Account> {
        self.accounts.get(&id).map(|a| a.clone())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn approved_donors(&self) -> Result<Vec<Donor>, StoreError> {
        Ok(self
            .accounts
            .iter()
            .filter_map(|a| match a.value() {
                Account::Donor(d) if d.identity.approved => Some(d.clone()),
                _ => None,
            })
            .collect())
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.account(id))
    }

    async fn approved_blood_banks(&self) -> Result<Vec<BloodBank>, StoreError> {
        Ok(self
            .accounts
            .iter()
            .filter_map(|a| match a.value() {
                Account::BloodBank(b) if b.identity.approved => Some(b.clone()),
                _ => None,
            })
            .collect())
    }
}

#[async_trait]
impl RequestRepo for MemoryStore {
    async fn insert(&self, request: &BloodRequest) -> Result<(), StoreError> {
        match self.requests.entry(request.id) {
            Entry::Occupied(_) => Err(StoreError::Backend(format!("request {} already exists", request.id))),
            Entry::Vacant(slot) => {
                slot.insert(request.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<BloodRequest>, StoreError> {
        Ok(self.requests.get(&id).map(|r| r.clone()))
    }

    async fn compare_and_swap(&self, request: &BloodRequest) -> Result<u64, StoreError> {
        let mut stored = self
            .requests
            .get_mut(&request.id)
            .ok_or_else(|| StoreError::Backend(format!("request {} does not exist", request.id)))?;
        if stored.version != request.version {
            debug!(request_id = %request.id, stored = stored.version, presented = request.version, "stale write rejected");
            return Err(StoreError::VersionConflict(request.id));
        }
        let version = request.version + 1;
        *stored = BloodRequest { version, ..request.clone() };
        Ok(version)
    }

    async fn list_by_status(&self, status: RequestStatus) -> Result<Vec<BloodRequest>, StoreError> {
        let mut found: Vec<BloodRequest> = self
            .requests
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.clone())
            .collect();
        found.sort_by_key(|r| (r.created_at, r.id));
        Ok(found)
    }

    async fn list_by_hospital(&self, hospital_id: Uuid) -> Result<Vec<BloodRequest>, StoreError> {
        let mut found: Vec<BloodRequest> = self
            .requests
            .iter()
            .filter(|r| r.hospital_id == hospital_id)
            .map(|r| r.clone())
            .collect();
        found.sort_by_key(|r| std::cmp::Reverse((r.created_at, r.id)));
        Ok(found)
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn units_available(&self, bank_id: Uuid, blood_type: BloodType) -> Result<u32, StoreError> {
        Ok(self
            .inventory
            .get(&(bank_id, blood_type))
            .map(|r| r.units_available)
            .unwrap_or(0))
    }

    async fn upsert(
        &self,
        bank_id: Uuid,
        blood_type: BloodType,
        units: u32,
        now: DateTime<Utc>,
    ) -> Result<InventoryRecord, StoreError> {
        let record = InventoryRecord { bank_id, blood_type, units_available: units, updated_at: now };
        self.inventory.insert((bank_id, blood_type), record.clone());
        Ok(record)
    }

    async fn list_for_bank(&self, bank_id: Uuid) -> Result<Vec<InventoryRecord>, StoreError> {
        let mut records: Vec<InventoryRecord> = self
            .inventory
            .iter()
            .filter(|r| r.bank_id == bank_id)
            .map(|r| r.clone())
            .collect();
        records.sort_by_key(|r| r.blood_type);
        Ok(records)
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn settle(&self, settlement: &Settlement) -> Result<(), StoreError> {
        let request = &settlement.request;
        let mut stored = self
            .requests
            .get_mut(&request.id)
            .ok_or_else(|| StoreError::Backend(format!("request {} does not exist", request.id)))?;
        if stored.version != request.version {
            return Err(StoreError::VersionConflict(request.id));
        }

        let mut stock = self.inventory.get_mut(&(settlement.bank_id, request.blood_type));
        let available = stock.as_ref().map(|s| s.units_available).unwrap_or(0);
        if available < request.units {
            return Err(StoreError::InsufficientStock { available, required: request.units });
        }

        let mut donor = match &settlement.credit {
            Some(credit) => {
                let account = self
                    .accounts
                    .get_mut(&credit.donor_id)
                    .filter(|a| matches!(a.value(), Account::Donor(_)))
                    .ok_or_else(|| StoreError::Backend(format!("donor {} does not exist", credit.donor_id)))?;
                Some((account, credit))
            }
            None => None,
        };

        // All checks passed; nothing below can fail.
        if let Some(stock) = stock.as_mut() {
            stock.units_available -= request.units;
            stock.updated_at = request.updated_at;
        }
        *stored = BloodRequest { version: request.version + 1, ..request.clone() };
        if let Some((account, credit)) = donor.as_mut() {
            if let Account::Donor(d) = account.value_mut() {
                d.donation_history.push(credit.record.clone());
                d.last_donation_at = Some(credit.record.donated_at);
            }
        }
        Ok(())
    }
}
