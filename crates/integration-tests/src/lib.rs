//! Shared fixtures for the cross-crate tests: an in-memory world with a
//! manual clock and a notifier that records every alert.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use domains::testing::ManualClock;
use domains::{
    geo, Account, Admin, BloodBank, BloodRequest, BloodType, Coordinates, DispatchError, Donor, Geofence, Hospital,
    Identity, InventoryStore, NewBloodRequest, NotificationDispatcher, RequestRepo, Urgency,
};
use services::{Broadcast, MatchingEngine, MatchingPolicy, Ports};
use storage_adapters::MemoryStore;
use uuid::Uuid;

pub const DELHI: Coordinates = Coordinates { lat: 28.6139, lng: 77.2090 };

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentAlert {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Records alerts; addresses marked failing are refused.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentAlert>>,
    failing: Mutex<BTreeSet<String>>,
    latency: Mutex<std::time::Duration>,
}

impl RecordingNotifier {
    /// Every later send waits this long before it is recorded.
    pub fn slow_down(&self, latency: std::time::Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn fail_for(&self, email: &str) {
        self.failing.lock().unwrap().insert(email.to_owned());
    }

    pub fn recover(&self, email: &str) {
        self.failing.lock().unwrap().remove(email);
    }

    pub fn sent(&self) -> Vec<SentAlert> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, email: &str) -> Vec<SentAlert> {
        self.sent().into_iter().filter(|a| a.to == email).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DispatchError> {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.failing.lock().unwrap().contains(to) {
            return Err(DispatchError(format!("mailbox {to} unavailable")));
        }
        self.sent.lock().unwrap().push(SentAlert {
            to: to.to_owned(),
            subject: subject.to_owned(),
            body: body.to_owned(),
        });
        Ok(())
    }
}

pub fn email_of(name: &str) -> String {
    format!("{}@example.org", name.to_lowercase().replace(' ', "."))
}

fn identity(name: &str) -> Identity {
    Identity { id: Uuid::now_v7(), name: name.to_owned(), email: email_of(name), approved: true }
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

/// Engine plus direct handles on everything behind its ports.
pub struct World {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
    pub engine: Arc<MatchingEngine>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self::with_policy(MatchingPolicy::default())
    }

    pub fn with_policy(policy: MatchingPolicy) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new(epoch()));
        let ports = Ports {
            accounts: store.clone(),
            requests: store.clone(),
            inventory: store.clone(),
            settlements: store.clone(),
            notifier: notifier.clone(),
            clock: clock.clone(),
        };
        let engine = Arc::new(MatchingEngine::new(ports, policy));
        Self { store, notifier, clock, engine }
    }

    pub fn now(&self) -> DateTime<Utc> {
        domains::Clock::now(self.clock.as_ref())
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn hospital(&self, name: &str, at: Coordinates) -> Uuid {
        self.hospital_with(name, at, None, true)
    }

    pub fn hospital_with(&self, name: &str, at: Coordinates, geofence: Option<Geofence>, approved: bool) -> Uuid {
        let identity = Identity { approved, ..identity(name) };
        let id = identity.id;
        self.store.put_account(Account::Hospital(Hospital { identity, location: Some(at), geofence }));
        id
    }

    pub fn donor(&self, name: &str, blood_type: BloodType, at: Coordinates) -> Uuid {
        self.donor_with(name, blood_type, Some(at), None, true)
    }

    pub fn donor_with(
        &self,
        name: &str,
        blood_type: BloodType,
        at: Option<Coordinates>,
        last_donation_at: Option<DateTime<Utc>>,
        approved: bool,
    ) -> Uuid {
        let identity = Identity { approved, ..identity(name) };
        let id = identity.id;
        self.store.put_account(Account::Donor(Donor {
            identity,
            blood_type,
            location: at,
            last_donation_at,
            donation_history: vec![],
        }));
        id
    }

    /// Donor `km` north of `origin`.
    pub fn donor_at(&self, name: &str, blood_type: BloodType, origin: Coordinates, km: f64) -> Uuid {
        self.donor(name, blood_type, geo::offset_north(origin, km))
    }

    pub fn blood_bank(&self, name: &str, at: Coordinates) -> Uuid {
        let identity = identity(name);
        let id = identity.id;
        self.store.put_account(Account::BloodBank(BloodBank {
            identity,
            location: Some(at),
            address: Some(format!("{name} campus")),
        }));
        id
    }

    pub fn admin(&self, name: &str) -> Uuid {
        let identity = identity(name);
        let id = identity.id;
        self.store.put_account(Account::Admin(Admin { identity }));
        id
    }

    pub async fn stock(&self, bank: Uuid, blood_type: BloodType, units: u32) {
        self.store.upsert(bank, blood_type, units, self.now()).await.unwrap();
    }

    pub async fn units(&self, bank: Uuid, blood_type: BloodType) -> u32 {
        self.store.units_available(bank, blood_type).await.unwrap()
    }

    pub async fn open(&self, hospital: Uuid, blood_type: BloodType, units: u32) -> Broadcast {
        self.engine
            .create_request(NewBloodRequest { hospital_id: hospital, blood_type, units, urgency: Urgency::High })
            .await
            .unwrap()
    }

    pub async fn stored(&self, request: Uuid) -> BloodRequest {
        self.store.get(request).await.unwrap().unwrap()
    }

    pub fn donor_account(&self, id: Uuid) -> Donor {
        match self.store.account(id) {
            Some(Account::Donor(d)) => d,
            other => panic!("expected donor {id}, found {other:?}"),
        }
    }
}
