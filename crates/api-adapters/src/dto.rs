//! Request and response bodies that are not engine types.

use domains::{BloodRequest, BloodType, Decision};
use serde::{Deserialize, Serialize};
use services::{AlertMode, Broadcast};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct RespondBody {
    pub donor_id: Uuid,
    pub decision: Decision,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FulfillBody {
    pub bank_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelBody {
    pub hospital_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryBody {
    pub blood_type: BloodType,
    pub units: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertModeBody {
    pub admin_id: Uuid,
    pub mode: AlertMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertModeView {
    pub mode: AlertMode,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewerQuery {
    pub donor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DonorQuery {
    pub donor_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HospitalQuery {
    pub hospital_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PointQuery {
    pub lat: f64,
    pub lng: f64,
}

/// A transition together with who was alerted.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastView {
    pub request: BloodRequest,
    pub notified: Vec<Uuid>,
    pub failed: Vec<Uuid>,
}

impl From<Broadcast> for BroadcastView {
    fn from(b: Broadcast) -> Self {
        Self { request: b.request, notified: b.delivered, failed: b.failed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respond_body_uses_lowercase_decisions() {
        let body: RespondBody =
            serde_json::from_str(&format!(r#"{{"donor_id":"{}","decision":"accepted"}}"#, Uuid::nil())).unwrap();
        assert_eq!(body.decision, Decision::Accepted);
        assert!(serde_json::from_str::<RespondBody>(&format!(
            r#"{{"donor_id":"{}","decision":"completed"}}"#,
            Uuid::nil()
        ))
        .is_err());
    }

    #[test]
    fn inventory_body_parses_blood_type_labels() {
        let body: InventoryBody = serde_json::from_str(r#"{"blood_type":"AB-","units":4}"#).unwrap();
        assert_eq!(body.blood_type, BloodType::AbNeg);
        assert!(serde_json::from_str::<InventoryBody>(r#"{"blood_type":"O+","units":-1}"#).is_err());
    }
}
