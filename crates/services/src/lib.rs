//! # services
//!
//! The request matching and escalation engine: eligibility, the escalation
//! state machine, the donor response protocol, fulfillment settlement and
//! the background sweeper. Talks to the outside world only through the
//! ports defined in `domains`.

pub mod eligibility;
pub mod engine;
pub mod escalation;
pub mod notifications;
pub mod policy;
pub mod queries;
pub mod responses;
pub mod scheduler;
pub mod settlement;

pub use engine::{Broadcast, MatchingEngine, Ports};
pub use notifications::AlertMode;
pub use policy::MatchingPolicy;
pub use queries::{DashboardStats, DonorProfileView, NearbyBank, RequestDetail, ResponseView};
pub use responses::ArrivalCheck;
pub use scheduler::{spawn_escalation_sweeper, sweep_once, SweepReport, SweeperConfig, SweeperHandle};
