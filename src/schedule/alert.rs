//! Operator alerts
//!
//! Alerts are plain records handed to the notification collaborator:
//! - `Alert`: one severity-tagged message
//! - `AlertLog`: bounded-age log of everything the engine raised
//! - `severity_for_load`: maps slot load to a severity level

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Alerts older than this are no longer active
pub const DEFAULT_ALERT_RETENTION_HOURS: i64 = 4;

/// Longest alert retention a config may ask for (one year)
pub const MAX_ALERT_RETENTION_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub severity: Severity,
    pub message: String,
    pub timestamp: NaiveDateTime,
}

impl Alert {
    pub fn new(severity: Severity, message: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            severity,
            message: message.into(),
            timestamp,
        }
    }
}

/// Severity for a slot holding `load` patients against `capacity` doctors.
///
/// CRITICAL above 1.5x capacity, HIGH above 1.25x, MEDIUM otherwise.
pub fn severity_for_load(load: usize, capacity: u32) -> Severity {
    let capacity = f64::from(capacity.max(1));
    let load = load as f64;
    if load > capacity * 1.5 {
        Severity::Critical
    } else if load > capacity * 1.25 {
        Severity::High
    } else {
        Severity::Medium
    }
}

/// Counts shown on the operator dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub active: usize,
    pub critical: usize,
    pub total_today: usize,
    pub latest: Option<String>,
}

/// Append-only alert log with age-based expiry
#[derive(Debug, Clone)]
pub struct AlertLog {
    alerts: Vec<Alert>,
    retention: Duration,
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_ALERT_RETENTION_HOURS))
    }
}

impl AlertLog {
    pub fn new(retention: Duration) -> Self {
        Self {
            alerts: Vec::new(),
            retention,
        }
    }

    pub fn push(&mut self, alert: Alert) {
        self.alerts.push(alert);
    }

    pub fn extend(&mut self, alerts: impl IntoIterator<Item = Alert>) {
        self.alerts.extend(alerts);
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn all(&self) -> &[Alert] {
        &self.alerts
    }

    /// Oldest timestamp still inside the window. `None` when the window
    /// reaches before the earliest representable time.
    fn cutoff(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        now.checked_sub_signed(self.retention)
    }

    /// Alerts raised within the retention window, newest first
    pub fn active(&self, now: NaiveDateTime) -> Vec<&Alert> {
        let cutoff = self.cutoff(now);
        let mut active: Vec<&Alert> = self
            .alerts
            .iter()
            .filter(|a| cutoff.map_or(true, |c| a.timestamp > c))
            .collect();
        active.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        active
    }

    /// Drop alerts that fell out of the retention window. Returns how many went.
    pub fn clear_older_than(&mut self, now: NaiveDateTime) -> usize {
        let Some(cutoff) = self.cutoff(now) else {
            return 0;
        };
        let before = self.alerts.len();
        self.alerts.retain(|a| a.timestamp > cutoff);
        before - self.alerts.len()
    }

    pub fn summary(&self, now: NaiveDateTime) -> AlertSummary {
        let active = self.active(now);
        AlertSummary {
            active: active.len(),
            critical: active
                .iter()
                .filter(|a| a.severity == Severity::Critical)
                .count(),
            total_today: self
                .alerts
                .iter()
                .filter(|a| a.timestamp.date() == now.date())
                .count(),
            latest: active.first().map(|a| a.message.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_severity_for_load() {
        assert_eq!(severity_for_load(4, 2), Severity::Critical);
        assert_eq!(severity_for_load(3, 2), Severity::High);
        assert_eq!(severity_for_load(5, 4), Severity::Medium);
        assert_eq!(severity_for_load(6, 4), Severity::High);
        assert_eq!(severity_for_load(2, 1), Severity::Critical);
        assert_eq!(severity_for_load(4, 3), Severity::High);
    }

    #[test]
    fn test_severity_serializes_uppercase() {
        let json = serde_json::to_string(&Severity::High).unwrap();
        assert_eq!(json, "\"HIGH\"");
    }

    #[test]
    fn test_active_window_and_pruning() {
        let mut log = AlertLog::default();
        log.push(Alert::new(Severity::Low, "old", at(8, 0)));
        log.push(Alert::new(Severity::Critical, "new", at(11, 0)));

        let now = at(12, 30);
        let active = log.active(now);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].message, "new");

        let summary = log.summary(now);
        assert_eq!(summary.active, 1);
        assert_eq!(summary.critical, 1);
        assert_eq!(summary.total_today, 2);
        assert_eq!(summary.latest.as_deref(), Some("new"));

        assert_eq!(log.clear_older_than(now), 1);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_huge_retention_keeps_everything() {
        let mut log = AlertLog::new(Duration::MAX);
        log.push(Alert::new(Severity::Low, "ancient", at(0, 0)));

        assert_eq!(log.active(at(23, 0)).len(), 1);
        assert_eq!(log.clear_older_than(at(23, 0)), 0);
        assert_eq!(log.len(), 1);
    }
}
