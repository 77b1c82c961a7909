//! # PostgreSQL store
//!
//! Requests are stored as JSONB documents next to the columns the engine
//! filters on. The `version` column is authoritative; the copy inside the
//! document is ignored on read.
//!
//! Settlement runs in one transaction holding row locks on the request,
//! the inventory row and the credited donor, so a failed check rolls
//! everything back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    Account, AccountStore, BloodBank, BloodRequest, BloodType, Donor, InventoryRecord, InventoryStore,
    RequestRepo, RequestStatus, Settlement, SettlementStore, StoreError,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

pub struct PgStore {
    pool: PgPool,
}

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn to_i64(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(backend)
}

fn decode_request(row: &PgRow) -> Result<BloodRequest, StoreError> {
    let body: serde_json::Value = row.try_get("body").map_err(backend)?;
    let mut request: BloodRequest = serde_json::from_value(body).map_err(backend)?;
    let version: i64 = row.try_get("version").map_err(backend)?;
    request.version = u64::try_from(version).map_err(backend)?;
    Ok(request)
}

fn decode_account(row: &PgRow) -> Result<Account, StoreError> {
    let payload: serde_json::Value = row.try_get("payload").map_err(backend)?;
    serde_json::from_value(payload).map_err(backend)
}

fn decode_inventory(row: &PgRow) -> Result<InventoryRecord, StoreError> {
    let blood_type: String = row.try_get("blood_type").map_err(backend)?;
    let units: i32 = row.try_get("units_available").map_err(backend)?;
    Ok(InventoryRecord {
        bank_id: row.try_get("bank_id").map_err(backend)?,
        blood_type: blood_type.parse().map_err(backend)?,
        units_available: u32::try_from(units).map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

impl PgStore {
    /// Connects and applies pending migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(backend)?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(backend)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Adds or replaces the engine's copy of an account.
    pub async fn put_account(&self, account: &Account) -> Result<(), StoreError> {
        let payload = serde_json::to_value(account).map_err(backend)?;
        sqlx::query(
            "INSERT INTO accounts (id, role, approved, payload, updated_at) VALUES ($1, $2, $3, $4, now()) \
             ON CONFLICT (id) DO UPDATE SET role = EXCLUDED.role, approved = EXCLUDED.approved, \
             payload = EXCLUDED.payload, updated_at = now()",
        )
        .bind(account.id())
        .bind(account.role())
        .bind(account.identity().approved)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn approved_by_role(&self, role: &str) -> Result<Vec<Account>, StoreError> {
        sqlx::query("SELECT payload FROM accounts WHERE role = $1 AND approved ORDER BY id")
            .bind(role)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?
            .iter()
            .map(decode_account)
            .collect()
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn approved_donors(&self) -> Result<Vec<Donor>, StoreError> {
        Ok(self
            .approved_by_role("donor")
            .await?
            .into_iter()
            .filter_map(Account::into_donor)
            .collect())
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        sqlx::query("SELECT payload FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .as_ref()
            .map(decode_account)
            .transpose()
    }

    async fn approved_blood_banks(&self) -> Result<Vec<BloodBank>, StoreError> {
        Ok(self
            .approved_by_role("blood_bank")
            .await?
            .into_iter()
            .filter_map(Account::into_blood_bank)
            .collect())
    }
}

#[async_trait]
impl RequestRepo for PgStore {
    async fn insert(&self, request: &BloodRequest) -> Result<(), StoreError> {
        let body = serde_json::to_value(request).map_err(backend)?;
        sqlx::query(
            "INSERT INTO blood_requests (id, hospital_id, status, search_stage, created_at, version, body) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(request.id)
        .bind(request.hospital_id)
        .bind(request.status.as_str())
        .bind(i16::from(request.search_stage.get()))
        .bind(request.created_at)
        .bind(to_i64(request.version)?)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<BloodRequest>, StoreError> {
        sqlx::query("SELECT body, version FROM blood_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .as_ref()
            .map(decode_request)
            .transpose()
    }

    async fn compare_and_swap(&self, request: &BloodRequest) -> Result<u64, StoreError> {
        let body = serde_json::to_value(request).map_err(backend)?;
        let row = sqlx::query(
            "UPDATE blood_requests SET status = $2, search_stage = $3, body = $4, version = version + 1 \
             WHERE id = $1 AND version = $5 RETURNING version",
        )
        .bind(request.id)
        .bind(request.status.as_str())
        .bind(i16::from(request.search_stage.get()))
        .bind(body)
        .bind(to_i64(request.version)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => {
                let version: i64 = row.try_get("version").map_err(backend)?;
                u64::try_from(version).map_err(backend)
            }
            None => Err(StoreError::VersionConflict(request.id)),
        }
    }

    async fn list_by_status(&self, status: RequestStatus) -> Result<Vec<BloodRequest>, StoreError> {
        sqlx::query("SELECT body, version FROM blood_requests WHERE status = $1 ORDER BY created_at, id")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?
            .iter()
            .map(decode_request)
            .collect()
    }

    async fn list_by_hospital(&self, hospital_id: Uuid) -> Result<Vec<BloodRequest>, StoreError> {
        sqlx::query(
            "SELECT body, version FROM blood_requests WHERE hospital_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(hospital_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?
        .iter()
        .map(decode_request)
        .collect()
    }
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn units_available(&self, bank_id: Uuid, blood_type: BloodType) -> Result<u32, StoreError> {
        let units: Option<i32> = sqlx::query_scalar(
            "SELECT units_available FROM inventory WHERE bank_id = $1 AND blood_type = $2",
        )
        .bind(bank_id)
        .bind(blood_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        u32::try_from(units.unwrap_or(0)).map_err(backend)
    }

    async fn upsert(
        &self,
        bank_id: Uuid,
        blood_type: BloodType,
        units: u32,
        now: DateTime<Utc>,
    ) -> Result<InventoryRecord, StoreError> {
        let row = sqlx::query(
            "INSERT INTO inventory (bank_id, blood_type, units_available, updated_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (bank_id, blood_type) DO UPDATE \
             SET units_available = EXCLUDED.units_available, updated_at = EXCLUDED.updated_at \
             RETURNING bank_id, blood_type, units_available, updated_at",
        )
        .bind(bank_id)
        .bind(blood_type.as_str())
        .bind(i32::try_from(units).map_err(backend)?)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        decode_inventory(&row)
    }

    async fn list_for_bank(&self, bank_id: Uuid) -> Result<Vec<InventoryRecord>, StoreError> {
        sqlx::query(
            "SELECT bank_id, blood_type, units_available, updated_at FROM inventory \
             WHERE bank_id = $1 ORDER BY blood_type",
        )
        .bind(bank_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?
        .iter()
        .map(decode_inventory)
        .collect()
    }
}

#[async_trait]
impl SettlementStore for PgStore {
    async fn settle(&self, settlement: &Settlement) -> Result<(), StoreError> {
        let request = &settlement.request;
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // 1. Lock the request and check nobody moved it
        let stored: Option<i64> = sqlx::query_scalar("SELECT version FROM blood_requests WHERE id = $1 FOR UPDATE")
            .bind(request.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?;
        match stored {
            None => return Err(StoreError::Backend(format!("request {} does not exist", request.id))),
            Some(v) if v != to_i64(request.version)? => return Err(StoreError::VersionConflict(request.id)),
            Some(_) => {}
        }

        // 2. Lock and check stock
        let units: Option<i32> = sqlx::query_scalar(
            "SELECT units_available FROM inventory WHERE bank_id = $1 AND blood_type = $2 FOR UPDATE",
        )
        .bind(settlement.bank_id)
        .bind(request.blood_type.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;
        let available = u32::try_from(units.unwrap_or(0)).map_err(backend)?;
        if available < request.units {
            return Err(StoreError::InsufficientStock { available, required: request.units });
        }

        sqlx::query(
            "UPDATE inventory SET units_available = units_available - $3, updated_at = $4 \
             WHERE bank_id = $1 AND blood_type = $2",
        )
        .bind(settlement.bank_id)
        .bind(request.blood_type.as_str())
        .bind(i32::try_from(request.units).map_err(backend)?)
        .bind(request.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        // 3. Close the request
        let body = serde_json::to_value(request).map_err(backend)?;
        sqlx::query(
            "UPDATE blood_requests SET status = $2, search_stage = $3, body = $4, version = version + 1 WHERE id = $1",
        )
        .bind(request.id)
        .bind(request.status.as_str())
        .bind(i16::from(request.search_stage.get()))
        .bind(body)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        // 4. Credit the donor
        if let Some(credit) = &settlement.credit {
            let row = sqlx::query("SELECT payload FROM accounts WHERE id = $1 FOR UPDATE")
                .bind(credit.donor_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?
                .ok_or_else(|| StoreError::Backend(format!("donor {} does not exist", credit.donor_id)))?;
            let mut donor = decode_account(&row)?
                .into_donor()
                .ok_or_else(|| StoreError::Backend(format!("account {} is not a donor", credit.donor_id)))?;
            donor.donation_history.push(credit.record.clone());
            donor.last_donation_at = Some(credit.record.donated_at);

            let payload = serde_json::to_value(Account::Donor(donor)).map_err(backend)?;
            sqlx::query("UPDATE accounts SET payload = $2, updated_at = now() WHERE id = $1")
                .bind(credit.donor_id)
                .bind(payload)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }
}
