//! Donor alert wording.
//!
//! The alert mode is an explicit argument: callers decide whether disaster
//! wording applies, nothing here reads shared state.

use std::sync::Arc;

use domains::{BloodRequest, BloodType, Donor, Hospital, NotificationDispatcher};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertMode {
    #[default]
    Normal,
    Disaster,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    NewRequest,
    RadiusExpanded,
}

fn respond_link(portal_url: &str, request: &BloodRequest) -> String {
    format!("{}/donor/request/{}", portal_url.trim_end_matches('/'), request.id)
}

pub fn compose(
    kind: AlertKind,
    mode: AlertMode,
    request: &BloodRequest,
    hospital: &Hospital,
    donor: &Donor,
    portal_url: &str,
) -> Message {
    match kind {
        AlertKind::NewRequest => new_request_alert(mode, request, hospital, donor, portal_url),
        AlertKind::RadiusExpanded => radius_expanded_alert(mode, request, hospital, donor, portal_url),
    }
}

pub fn new_request_alert(
    mode: AlertMode,
    request: &BloodRequest,
    hospital: &Hospital,
    donor: &Donor,
    portal_url: &str,
) -> Message {
    let (subject, preamble) = match mode {
        AlertMode::Disaster => (
            "EMERGENCY BLOOD ALERT - DISASTER MODE",
            "DISASTER MODE ACTIVE\nImmediate blood donation required.\n\n",
        ),
        AlertMode::Normal => ("Urgent Blood Request - BloodBridge", ""),
    };
    let universal = if donor.blood_type == BloodType::ONeg {
        " (Universal Donor)"
    } else {
        ""
    };
    let body = format!(
        "{preamble}Hello {name},\n\n\
         Blood required: {required} ({units} unit(s))\n\
         Your blood group: {own}{universal}\n\
         Hospital: {hospital}\n\
         Urgency: {urgency}\n\n\
         Respond here: {link}\n\n\
         Please respond as soon as possible.\n",
        name = donor.identity.name,
        required = request.blood_type,
        units = request.units,
        own = donor.blood_type,
        hospital = hospital.identity.name,
        urgency = request.urgency.as_str().to_uppercase(),
        link = respond_link(portal_url, request),
    );
    Message { subject: subject.to_string(), body }
}

pub fn radius_expanded_alert(
    mode: AlertMode,
    request: &BloodRequest,
    hospital: &Hospital,
    donor: &Donor,
    portal_url: &str,
) -> Message {
    let subject = match mode {
        AlertMode::Disaster => "EMERGENCY - Blood Search Radius Expanded",
        AlertMode::Normal => "Blood Request Radius Expanded - BloodBridge",
    };
    let body = format!(
        "Hello {name},\n\n\
         Blood ({required}) is needed within {radius} km.\n\
         Hospital: {hospital}\n\n\
         Respond here: {link}\n",
        name = donor.identity.name,
        required = request.blood_type,
        radius = request.search_radius_km,
        hospital = hospital.identity.name,
        link = respond_link(portal_url, request),
    );
    Message { subject: subject.to_string(), body }
}

/// Result of one broadcast round.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub delivered: Vec<Uuid>,
    pub failed: Vec<Uuid>,
}

/// Sends every message concurrently, each bounded by `timeout`.
/// Failures are logged and reported, never propagated.
pub async fn dispatch_all(
    notifier: Arc<dyn NotificationDispatcher>,
    messages: Vec<(Uuid, String, Message)>,
    timeout: std::time::Duration,
) -> DispatchOutcome {
    let mut tasks = JoinSet::new();
    for (donor_id, email, message) in messages {
        let notifier = Arc::clone(&notifier);
        tasks.spawn(async move {
            let sent = tokio::time::timeout(
                timeout,
                notifier.send(&email, &message.subject, &message.body),
            )
            .await;
            (donor_id, sent)
        });
    }

    let mut outcome = DispatchOutcome::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((donor_id, Ok(Ok(())))) => {
                debug!(%donor_id, "donor notified");
                outcome.delivered.push(donor_id);
            }
            Ok((donor_id, Ok(Err(e)))) => {
                warn!(%donor_id, error = %e, "notification dispatch failed");
                outcome.failed.push(donor_id);
            }
            Ok((donor_id, Err(_))) => {
                warn!(%donor_id, "notification dispatch timed out");
                outcome.failed.push(donor_id);
            }
            Err(e) => warn!(error = %e, "notification task aborted"),
        }
    }
    outcome.delivered.sort();
    outcome.failed.sort();
    outcome
}
