//! Tunable matching parameters.

use std::time::Duration;

use domains::RadiusLadder;

#[derive(Debug, Clone)]
pub struct MatchingPolicy {
    /// Minimum time between two donations by the same donor.
    pub cooldown: chrono::Duration,
    pub ladder: RadiusLadder,
    /// Used when a hospital has no geofence radius of its own.
    pub geofence_radius_m: f64,
    pub nearby_bank_radius_km: f64,
    /// Optimistic-concurrency retries before giving up with `Conflict`.
    pub max_write_attempts: u32,
    /// Upper bound on a single notification send.
    pub dispatch_timeout: Duration,
    /// Base URL donors follow to answer a request.
    pub portal_url: String,
}

impl MatchingPolicy {
    pub fn with_cooldown_days(mut self, days: u32) -> Self {
        self.cooldown = chrono::Duration::days(i64::from(days));
        self
    }
}

impl Default for MatchingPolicy {
    fn default() -> Self {
        Self {
            cooldown: chrono::Duration::days(90),
            ladder: RadiusLadder::default(),
            geofence_radius_m: 300.0,
            nearby_bank_radius_km: 15.0,
            max_write_attempts: 5,
            dispatch_timeout: Duration::from_secs(10),
            portal_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Whole days, rounded up.
pub(crate) fn ceil_days(d: chrono::Duration) -> i64 {
    const DAY: i64 = 86_400;
    (d.num_seconds() + DAY - 1).div_euclid(DAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let p = MatchingPolicy::default();
        assert_eq!(p.cooldown, chrono::Duration::days(90));
        assert_eq!(p.geofence_radius_m, 300.0);
        assert_eq!(p.with_cooldown_days(56).cooldown, chrono::Duration::days(56));
    }

    #[test]
    fn ceil_days_rounds_up() {
        assert_eq!(ceil_days(chrono::Duration::days(3)), 3);
        assert_eq!(ceil_days(chrono::Duration::days(3) + chrono::Duration::seconds(1)), 4);
        assert_eq!(ceil_days(chrono::Duration::hours(1)), 1);
        assert_eq!(ceil_days(chrono::Duration::zero()), 0);
    }
}
