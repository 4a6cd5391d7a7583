//! Readiness conditions and the condition ledger
//!
//! A [`Conditions`] ledger is a small ordered map keyed by [`ConditionType`].
//! The umbrella [`ConditionType::Ready`] condition summarises every other
//! condition; all other entries are sub-conditions owned by individual
//! convergence stages.
//!
//! Invariant: `last_transition_time` only moves when `status` changes.
//! Re-asserting a condition with the same status keeps the old timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Named readiness facts tracked for a topology
///
/// Variant order is the order conditions are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConditionType {
    Ready,
    InputReady,
    DatabaseAccountReady,
    #[serde(rename = "DBReady")]
    DbReady,
    ServiceConfigReady,
    #[serde(rename = "DBSyncReady")]
    DbSyncReady,
    ServiceAccountReady,
    RoleReady,
    RoleBindingReady,
    TransportReady,
    NetworkAttachmentsReady,
    ManagementNetworkReady,
    ApiReady,
    HealthManagerReady,
    HousekeepingReady,
    WorkerReady,
    DeploymentReady,
    ExposeServiceReady,
}

impl ConditionType {
    /// Every condition type, umbrella first
    pub const ALL: [ConditionType; 18] = [
        ConditionType::Ready,
        ConditionType::InputReady,
        ConditionType::DatabaseAccountReady,
        ConditionType::DbReady,
        ConditionType::ServiceConfigReady,
        ConditionType::DbSyncReady,
        ConditionType::ServiceAccountReady,
        ConditionType::RoleReady,
        ConditionType::RoleBindingReady,
        ConditionType::TransportReady,
        ConditionType::NetworkAttachmentsReady,
        ConditionType::ManagementNetworkReady,
        ConditionType::ApiReady,
        ConditionType::HealthManagerReady,
        ConditionType::HousekeepingReady,
        ConditionType::WorkerReady,
        ConditionType::DeploymentReady,
        ConditionType::ExposeServiceReady,
    ];

    /// Human readable subject used in condition messages
    pub fn label(&self) -> &'static str {
        match self {
            ConditionType::Ready => "Setup",
            ConditionType::InputReady => "Input data",
            ConditionType::DatabaseAccountReady => "Database account",
            ConditionType::DbReady => "Database",
            ConditionType::ServiceConfigReady => "Service config",
            ConditionType::DbSyncReady => "Database sync",
            ConditionType::ServiceAccountReady => "Service account",
            ConditionType::RoleReady => "Role",
            ConditionType::RoleBindingReady => "Role binding",
            ConditionType::TransportReady => "Transport",
            ConditionType::NetworkAttachmentsReady => "Network attachments",
            ConditionType::ManagementNetworkReady => "Management network",
            ConditionType::ApiReady => "API",
            ConditionType::HealthManagerReady => "Health manager",
            ConditionType::HousekeepingReady => "Housekeeping",
            ConditionType::WorkerReady => "Worker",
            ConditionType::DeploymentReady => "Asset uploader deployment",
            ConditionType::ExposeServiceReady => "Asset uploader service",
        }
    }

    pub fn init_message(&self) -> String {
        format!("{} not started", self.label())
    }

    pub fn ready_message(&self) -> String {
        format!("{} completed", self.label())
    }

    pub fn waiting_message(&self) -> String {
        format!("{} in progress", self.label())
    }

    pub fn error_message(&self, error: &dyn fmt::Display) -> String {
        format!("{} error occurred: {}", self.label(), error)
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // serde names are the canonical spelling
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        f.write_str(&name)
    }
}

/// Tri-state condition status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

/// Severity of a False condition; `None` for True/Unknown
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Severity {
    #[default]
    None,
    Info,
    Warning,
    Error,
}

/// Machine readable reason for the current status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Reason {
    #[default]
    Init,
    Requested,
    Ready,
    Error,
}

/// A single readiness fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: ConditionStatus,
    pub reason: Reason,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: Reason,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type,
            status,
            reason,
            severity,
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// Unknown condition in the initial state
    pub fn unknown(condition_type: ConditionType) -> Self {
        Self::new(
            condition_type,
            ConditionStatus::Unknown,
            Reason::Init,
            Severity::None,
            condition_type.init_message(),
        )
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    pub fn is_false(&self) -> bool {
        self.status == ConditionStatus::False
    }
}

/// Ordered readiness ledger keyed by condition type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Condition>", into = "Vec<Condition>")]
pub struct Conditions(BTreeMap<ConditionType, Condition>);

impl From<Vec<Condition>> for Conditions {
    fn from(list: Vec<Condition>) -> Self {
        Self(list.into_iter().map(|c| (c.condition_type, c)).collect())
    }
}

impl From<Conditions> for Vec<Condition> {
    fn from(ledger: Conditions) -> Self {
        ledger.0.into_values().collect()
    }
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.0.get(&condition_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.values()
    }

    pub fn is_true(&self, condition_type: ConditionType) -> bool {
        self.get(condition_type).is_some_and(Condition::is_true)
    }

    pub fn status(&self, condition_type: ConditionType) -> ConditionStatus {
        self.get(condition_type)
            .map(|c| c.status)
            .unwrap_or_default()
    }

    /// Adds every given condition type that is not yet present as Unknown/Init.
    /// Existing entries are left untouched.
    pub fn init(&mut self, types: impl IntoIterator<Item = ConditionType>) {
        for condition_type in types {
            self.0
                .entry(condition_type)
                .or_insert_with(|| Condition::unknown(condition_type));
        }
    }

    /// Upserts a condition, keeping the previous transition time when the
    /// status is unchanged.
    pub fn set(&mut self, mut condition: Condition) {
        if let Some(previous) = self.0.get(&condition.condition_type) {
            if previous.status == condition.status {
                condition.last_transition_time = previous.last_transition_time;
            }
        }
        self.0.insert(condition.condition_type, condition);
    }

    pub fn mark_true(&mut self, condition_type: ConditionType, message: impl Into<String>) {
        self.set(Condition::new(
            condition_type,
            ConditionStatus::True,
            Reason::Ready,
            Severity::None,
            message,
        ));
    }

    pub fn mark_false(
        &mut self,
        condition_type: ConditionType,
        reason: Reason,
        severity: Severity,
        message: impl Into<String>,
    ) {
        self.set(Condition::new(
            condition_type,
            ConditionStatus::False,
            reason,
            severity,
            message,
        ));
    }

    pub fn mark_unknown(
        &mut self,
        condition_type: ConditionType,
        reason: Reason,
        message: impl Into<String>,
    ) {
        self.set(Condition::new(
            condition_type,
            ConditionStatus::Unknown,
            reason,
            Severity::None,
            message,
        ));
    }

    /// Whether every condition except `Ready` is True
    pub fn all_sub_conditions_true(&self) -> bool {
        self.0
            .values()
            .filter(|c| c.condition_type != ConditionType::Ready)
            .all(Condition::is_true)
    }

    /// Copies the `Ready` condition of another ledger into `target`.
    ///
    /// Returns the mirrored condition, or `None` when the source has not
    /// reported readiness yet; the caller then decides the local status.
    pub fn mirror(&mut self, target: ConditionType, source: &Conditions) -> Option<Condition> {
        let ready = source.get(ConditionType::Ready)?;
        let mirrored = Condition {
            condition_type: target,
            ..ready.clone()
        };
        self.set(mirrored);
        self.get(target).cloned()
    }

    /// Restores transition times from an earlier snapshot for every condition
    /// whose status has not changed since the snapshot.
    pub fn restore_last_transition_times(&mut self, saved: &Conditions) {
        for (condition_type, condition) in self.0.iter_mut() {
            if let Some(previous) = saved.get(*condition_type) {
                if previous.status == condition.status {
                    condition.last_transition_time = previous.last_transition_time;
                }
            }
        }
    }

    /// Recomputes the umbrella `Ready` condition from the sub-conditions.
    ///
    /// True when every sub-condition is True; otherwise False carrying the
    /// most severe False sub-condition; otherwise Unknown.
    pub fn summarize_ready(&mut self) {
        if self.all_sub_conditions_true() {
            self.mark_true(ConditionType::Ready, ConditionType::Ready.ready_message());
            return;
        }

        let worst = self
            .0
            .values()
            .filter(|c| c.condition_type != ConditionType::Ready && c.is_false())
            // max_by_key keeps the last maximum; reverse so ties go to the earliest type
            .rev()
            .max_by_key(|c| c.severity)
            .cloned();

        match worst {
            Some(worst) => self.mark_false(
                ConditionType::Ready,
                worst.reason,
                worst.severity,
                worst.message,
            ),
            None => self.mark_unknown(
                ConditionType::Ready,
                Reason::Init,
                ConditionType::Ready.waiting_message(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_mark_false_twice_keeps_transition_time() {
        let mut ledger = Conditions::new();
        ledger.mark_false(ConditionType::DbReady, Reason::Requested, Severity::Info, "waiting");
        let first = ledger.get(ConditionType::DbReady).unwrap().last_transition_time;

        std::thread::sleep(Duration::from_millis(5));
        ledger.mark_false(ConditionType::DbReady, Reason::Requested, Severity::Info, "waiting");

        let second = ledger.get(ConditionType::DbReady).unwrap().last_transition_time;
        assert_eq!(first, second);
    }

    #[test]
    fn test_status_change_moves_transition_time() {
        let mut ledger = Conditions::new();
        ledger.mark_false(ConditionType::DbReady, Reason::Requested, Severity::Info, "waiting");
        let before = ledger.get(ConditionType::DbReady).unwrap().last_transition_time;

        std::thread::sleep(Duration::from_millis(5));
        ledger.mark_true(ConditionType::DbReady, "done");

        let after = ledger.get(ConditionType::DbReady).unwrap().last_transition_time;
        assert!(after > before);
    }

    #[test]
    fn test_init_does_not_reset_existing() {
        let mut ledger = Conditions::new();
        ledger.mark_true(ConditionType::ApiReady, "up");
        ledger.init(ConditionType::ALL);

        assert_eq!(ledger.len(), ConditionType::ALL.len());
        assert!(ledger.is_true(ConditionType::ApiReady));
        assert_eq!(ledger.status(ConditionType::DbReady), ConditionStatus::Unknown);
    }

    #[test]
    fn test_all_sub_conditions_ignores_ready() {
        let mut ledger = Conditions::new();
        ledger.init([ConditionType::Ready, ConditionType::ApiReady]);
        assert!(!ledger.all_sub_conditions_true());

        ledger.mark_true(ConditionType::ApiReady, "up");
        assert!(ledger.all_sub_conditions_true());
        assert!(!ledger.is_true(ConditionType::Ready));
    }

    #[test]
    fn test_mirror_copies_ready_or_returns_none() {
        let mut child = Conditions::new();
        let mut parent = Conditions::new();

        assert!(parent.mirror(ConditionType::ApiReady, &child).is_none());
        assert!(parent.get(ConditionType::ApiReady).is_none());

        child.mark_false(ConditionType::Ready, Reason::Requested, Severity::Info, "scaling");
        let mirrored = parent.mirror(ConditionType::ApiReady, &child).unwrap();
        assert_eq!(mirrored.condition_type, ConditionType::ApiReady);
        assert_eq!(mirrored.status, ConditionStatus::False);
        assert_eq!(mirrored.message, "scaling");
    }

    #[test]
    fn test_summarize_picks_most_severe_false() {
        let mut ledger = Conditions::new();
        ledger.init(ConditionType::ALL);
        ledger.mark_false(ConditionType::DbReady, Reason::Requested, Severity::Info, "db pending");
        ledger.mark_false(ConditionType::ApiReady, Reason::Error, Severity::Warning, "api broke");
        ledger.summarize_ready();

        let ready = ledger.get(ConditionType::Ready).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, Reason::Error);
        assert_eq!(ready.message, "api broke");
    }

    #[test]
    fn test_summarize_true_when_everything_true() {
        let mut ledger = Conditions::new();
        for condition_type in ConditionType::ALL.into_iter().skip(1) {
            ledger.mark_true(condition_type, "ok");
        }
        ledger.summarize_ready();
        assert!(ledger.is_true(ConditionType::Ready));
    }

    #[test]
    fn test_restore_transition_times_only_for_same_status() {
        let mut ledger = Conditions::new();
        ledger.init([ConditionType::DbReady, ConditionType::ApiReady]);
        let saved = ledger.clone();

        std::thread::sleep(Duration::from_millis(5));
        // overwrite without going through set to simulate a reset ledger
        let mut reset = Conditions::new();
        reset.init([ConditionType::DbReady]);
        reset.mark_true(ConditionType::ApiReady, "up");
        reset.restore_last_transition_times(&saved);

        assert_eq!(
            reset.get(ConditionType::DbReady).unwrap().last_transition_time,
            saved.get(ConditionType::DbReady).unwrap().last_transition_time
        );
        assert_ne!(
            reset.get(ConditionType::ApiReady).unwrap().last_transition_time,
            saved.get(ConditionType::ApiReady).unwrap().last_transition_time
        );
    }

    #[test]
    fn test_ledger_serializes_as_list() {
        let mut ledger = Conditions::new();
        ledger.mark_true(ConditionType::DbReady, "ok");

        let value = serde_json::to_value(&ledger).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["type"], "DBReady");

        let back: Conditions = serde_json::from_value(value).unwrap();
        assert_eq!(back, ledger);
    }
}
