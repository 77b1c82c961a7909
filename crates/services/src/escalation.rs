//! Escalation state machine: opening, widening and cancelling requests.

use domains::{BloodRequest, DomainError, NewBloodRequest, Result};
use tracing::info;
use uuid::Uuid;

use crate::engine::{claim_within_radius, hospital_origin, Broadcast, MatchingEngine};
use crate::notifications::AlertKind;

impl MatchingEngine {
    /// Opens a request at stage 1 and notifies donors within the first radius.
    pub async fn create_request(&self, input: NewBloodRequest) -> Result<Broadcast> {
        let hospital = self.hospital(input.hospital_id).await?;
        if !hospital.identity.approved {
            return Err(DomainError::Forbidden(format!(
                "hospital {} is not approved",
                hospital.identity.id
            )));
        }
        let origin = hospital_origin(&hospital)?;
        let ranked = self.reachable_donors(input.blood_type, origin).await?;

        let mut request = BloodRequest::open(input, &self.policy.ladder, self.now())?;
        let claimed = claim_within_radius(&mut request, &ranked);
        self.ports.requests.insert(&request).await?;
        info!(
            request_id = %request.id,
            hospital_id = %request.hospital_id,
            blood_type = %request.blood_type,
            units = request.units,
            urgency = request.urgency.as_str(),
            "blood request opened"
        );

        self.dispatch_claimed(request, claimed, &ranked, &hospital, AlertKind::NewRequest).await
    }

    /// Widens the search by one stage and notifies newly reachable donors.
    ///
    /// Refused once any donor has accepted, whoever triggers it. The donors
    /// to alert are claimed in the same write as the new stage, so
    /// overlapping escalations never alert a donor twice.
    pub async fn escalate(&self, request_id: Uuid) -> Result<Broadcast> {
        let current = self.request(request_id).await?;
        let hospital = self.hospital(current.hospital_id).await?;
        let origin = hospital_origin(&hospital)?;
        let ranked = self.reachable_donors(current.blood_type, origin).await?;

        let now = self.now();
        let ladder = self.policy.ladder;
        let (request, (stage, claimed)) = self
            .update_request(
                request_id,
                || DomainError::NotFound("request", request_id.to_string()),
                |r| {
                    let stage = r.escalate(&ladder, now)?;
                    Ok((stage, claim_within_radius(r, &ranked)))
                },
            )
            .await?;
        info!(
            request_id = %request_id,
            stage = stage.get(),
            radius_km = request.search_radius_km,
            "search radius escalated"
        );

        self.dispatch_claimed(request, claimed, &ranked, &hospital, AlertKind::RadiusExpanded).await
    }

    /// Cancels a pending request on behalf of its owning hospital.
    pub async fn cancel(&self, request_id: Uuid, hospital_id: Uuid) -> Result<BloodRequest> {
        let now = self.now();
        let (request, ()) = self
            .update_request(
                request_id,
                || DomainError::NotFound("request", request_id.to_string()),
                |r| {
                    if r.hospital_id != hospital_id {
                        return Err(DomainError::Forbidden(format!(
                            "request {request_id} belongs to another hospital"
                        )));
                    }
                    r.cancel(now)
                },
            )
            .await?;
        info!(request_id = %request_id, "blood request cancelled");
        Ok(request)
    }
}
