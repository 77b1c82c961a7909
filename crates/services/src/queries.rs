//! Read-side views and the small inventory surface used by blood banks.

use chrono::{DateTime, Utc};
use domains::{
    geo, BloodRequest, BloodType, Coordinates, DomainError, DonationRecord, InventoryRecord, RequestStatus,
    ResponseStatus, Result, SearchStage, Urgency,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::MatchingEngine;
use crate::policy::ceil_days;

#[derive(Debug, Clone, Serialize)]
pub struct HospitalSummary {
    pub id: Uuid,
    pub name: String,
    pub location: Option<Coordinates>,
}

/// What a donor sees when opening a request link.
#[derive(Debug, Clone, Serialize)]
pub struct RequestDetail {
    pub request_id: Uuid,
    pub blood_type: BloodType,
    pub units: u32,
    pub urgency: Urgency,
    pub status: RequestStatus,
    pub search_stage: SearchStage,
    pub search_radius_km: f64,
    pub hospital: HospitalSummary,
    /// Donor to hospital, when both positions are known.
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RespondingDonor {
    pub id: Uuid,
    pub name: String,
    pub blood_type: BloodType,
    pub distance_km: Option<f64>,
}

/// A response as shown to the hospital. Donor identity is only revealed
/// for accepted or completed responses.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseView {
    pub status: ResponseStatus,
    pub responded_at: DateTime<Utc>,
    pub donor: Option<RespondingDonor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DonorProfileView {
    pub id: Uuid,
    pub name: String,
    pub blood_type: BloodType,
    pub total_donations: usize,
    pub last_donation_at: Option<DateTime<Utc>>,
    pub eligible_to_donate: bool,
    pub cooldown_remaining_days: i64,
    pub donation_history: Vec<DonationRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_requests: usize,
    pub pending_requests: usize,
    pub fulfilled_requests: usize,
    pub cancelled_requests: usize,
    pub accepted_responses: usize,
    pub completed_donations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct NearbyBank {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub distance_km: f64,
    pub inventory: Vec<InventoryRecord>,
}

impl MatchingEngine {
    pub async fn request_detail(&self, request_id: Uuid, donor_id: Option<Uuid>) -> Result<RequestDetail> {
        let request = self.request(request_id).await?;
        let hospital = self.hospital(request.hospital_id).await?;
        let viewer = match donor_id {
            Some(id) => self.donor(id).await?.location,
            None => None,
        };
        let distance_km = match (viewer, hospital.location) {
            (Some(a), Some(b)) => Some(geo::distance_km(a, b)),
            _ => None,
        };
        Ok(RequestDetail {
            request_id: request.id,
            blood_type: request.blood_type,
            units: request.units,
            urgency: request.urgency,
            status: request.status,
            search_stage: request.search_stage,
            search_radius_km: request.search_radius_km,
            hospital: HospitalSummary {
                id: hospital.identity.id,
                name: hospital.identity.name,
                location: hospital.location,
            },
            distance_km,
        })
    }

    /// Responses for the owning hospital, with non-committed donors redacted.
    pub async fn responses_for(&self, request_id: Uuid, hospital_id: Uuid) -> Result<Vec<ResponseView>> {
        let request = self.request(request_id).await?;
        if request.hospital_id != hospital_id {
            return Err(DomainError::Forbidden(format!(
                "request {request_id} belongs to another hospital"
            )));
        }
        let hospital = self.hospital(hospital_id).await?;

        let mut views = Vec::with_capacity(request.responses.len());
        for response in &request.responses {
            let donor = match response.status {
                ResponseStatus::Accepted | ResponseStatus::Completed => {
                    match self.donor(response.donor_id).await {
                        Ok(d) => Some(RespondingDonor {
                            id: d.identity.id,
                            name: d.identity.name,
                            blood_type: d.blood_type,
                            distance_km: d.location.zip(hospital.location).map(|(a, b)| geo::distance_km(a, b)),
                        }),
                        Err(DomainError::NotFound(..)) => None,
                        Err(e) => return Err(e),
                    }
                }
                ResponseStatus::Declined => None,
            };
            views.push(ResponseView {
                status: response.status,
                responded_at: response.responded_at,
                donor,
            });
        }
        Ok(views)
    }

    pub async fn donor_profile(&self, donor_id: Uuid) -> Result<DonorProfileView> {
        let donor = self.donor(donor_id).await?;
        let remaining = donor.cooldown_remaining(self.now(), self.policy.cooldown);
        Ok(DonorProfileView {
            id: donor.identity.id,
            name: donor.identity.name,
            blood_type: donor.blood_type,
            total_donations: donor.donation_history.len(),
            last_donation_at: donor.last_donation_at,
            eligible_to_donate: remaining.is_none(),
            cooldown_remaining_days: remaining.map(ceil_days).unwrap_or(0),
            donation_history: donor.donation_history,
        })
    }

    pub async fn hospital_dashboard(&self, hospital_id: Uuid) -> Result<DashboardStats> {
        self.hospital(hospital_id).await?;
        let requests = self.ports.requests.list_by_hospital(hospital_id).await?;
        let mut stats = DashboardStats { total_requests: requests.len(), ..Default::default() };
        for request in &requests {
            match request.status {
                RequestStatus::Pending => stats.pending_requests += 1,
                RequestStatus::Fulfilled => stats.fulfilled_requests += 1,
                RequestStatus::Cancelled => stats.cancelled_requests += 1,
            }
            for response in &request.responses {
                match response.status {
                    ResponseStatus::Accepted => stats.accepted_responses += 1,
                    ResponseStatus::Completed => stats.completed_donations += 1,
                    ResponseStatus::Declined => {}
                }
            }
        }
        Ok(stats)
    }

    /// Pending requests, most urgent first, oldest first within a tier.
    pub async fn pending_requests(&self) -> Result<Vec<BloodRequest>> {
        let mut pending = self.ports.requests.list_by_status(RequestStatus::Pending).await?;
        pending.sort_by(|a, b| {
            urgency_rank(b.urgency)
                .cmp(&urgency_rank(a.urgency))
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(pending)
    }

    pub async fn update_inventory(&self, bank_id: Uuid, blood_type: BloodType, units: u32) -> Result<InventoryRecord> {
        self.blood_bank(bank_id).await?;
        let record = self.ports.inventory.upsert(bank_id, blood_type, units, self.now()).await?;
        info!(bank_id = %bank_id, blood_type = %blood_type, units, "inventory updated");
        Ok(record)
    }

    pub async fn inventory(&self, bank_id: Uuid) -> Result<Vec<InventoryRecord>> {
        self.blood_bank(bank_id).await?;
        Ok(self.ports.inventory.list_for_bank(bank_id).await?)
    }

    /// Approved banks within the configured radius of `origin`, nearest first.
    pub async fn nearby_blood_banks(&self, origin: Coordinates) -> Result<Vec<NearbyBank>> {
        let radius = self.policy.nearby_bank_radius_km;
        let banks = self.ports.accounts.approved_blood_banks().await?;

        let mut nearby = Vec::new();
        for bank in banks {
            let Some(location) = bank.location else { continue };
            let distance_km = geo::distance_km(origin, location);
            if distance_km > radius {
                continue;
            }
            let inventory = self.ports.inventory.list_for_bank(bank.identity.id).await?;
            nearby.push(NearbyBank {
                id: bank.identity.id,
                name: bank.identity.name,
                address: bank.address,
                distance_km,
                inventory,
            });
        }
        nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        Ok(nearby)
    }
}

fn urgency_rank(u: Urgency) -> u8 {
    match u {
        Urgency::Low => 0,
        Urgency::Medium => 1,
        Urgency::High => 2,
    }
}
