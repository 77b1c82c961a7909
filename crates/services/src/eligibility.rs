//! Eligibility filter: which donors may be asked to serve a request.

use std::collections::BTreeSet;

use domains::{compatibility, geo, BloodType, Coordinates, Donor, DomainError, Result};
use uuid::Uuid;

/// Parameters of one eligibility lookup.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityQuery<'a> {
    pub required: BloodType,
    pub origin: Coordinates,
    pub radius_km: f64,
    pub excluded: &'a BTreeSet<Uuid>,
}

impl EligibilityQuery<'_> {
    pub fn validate(&self) -> Result<()> {
        if !self.radius_km.is_finite() || self.radius_km <= 0.0 {
            return Err(DomainError::Validation(format!(
                "search radius must be positive, got {}",
                self.radius_km
            )));
        }
        Ok(())
    }

    /// Distance to `donor` if the donor qualifies.
    fn admits(&self, donor: &Donor) -> Option<f64> {
        if !donor.identity.approved || self.excluded.contains(&donor.identity.id) {
            return None;
        }
        if !compatibility::can_donate(donor.blood_type, self.required) {
            return None;
        }
        let distance = geo::distance_km(self.origin, donor.location?);
        (distance <= self.radius_km).then_some(distance)
    }
}

/// Qualifying donors with their distance in km, nearest first (ties by id).
pub fn rank_eligible(donors: Vec<Donor>, query: &EligibilityQuery<'_>) -> Vec<(f64, Donor)> {
    let mut ranked: Vec<(f64, Donor)> = donors
        .into_iter()
        .filter_map(|d| query.admits(&d).map(|km| (km, d)))
        .collect();
    ranked.sort_by(|(a_km, a), (b_km, b)| {
        a_km.total_cmp(b_km).then_with(|| a.identity.id.cmp(&b.identity.id))
    });
    ranked
}

/// Donors that qualify, nearest first (ties by id). Pure.
pub fn filter_eligible(donors: Vec<Donor>, query: &EligibilityQuery<'_>) -> Vec<Donor> {
    rank_eligible(donors, query).into_iter().map(|(_, d)| d).collect()
}
