//! Conditions evaluated against resource snapshots
//!
//! Each [`Condition`] variant is a pure, stateless check for one resource kind.
//! Evaluation never performs I/O; the poll loop owns fetching.

use serde_json::Value;

use crate::fetch::{ResourceKind, Snapshot};

/// Pod phase reported once all containers exited successfully
pub const POD_PHASE_SUCCEEDED: &str = "Succeeded";
/// Pod phase reported once a container exited with failure
pub const POD_PHASE_FAILED: &str = "Failed";
/// Reason attached to a failed pod outcome
pub const REASON_POD_FAILED: &str = "PodFailed";
/// Reason used when a failed BuildRun carries no reason of its own
pub const REASON_BUILD_RUN_FAILED: &str = "BuildRunFailed";

/// Condition type Shipwright uses to report BuildRun completion
const BUILD_RUN_SUCCEEDED_CONDITION: &str = "Succeeded";

/// Verdict for a single snapshot
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConditionResult {
    /// Not there yet, keep polling
    Pending,
    /// Desired state reached
    Satisfied,
    /// Terminal failure; polling must stop
    Failed {
        /// Machine-readable reason
        reason: String,
        /// Human-readable detail
        message: String,
    },
}

impl ConditionResult {
    fn failed(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Condition to wait for, selected per resource kind
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    /// The Secret exists
    SecretExistence,
    /// The Pod ran to completion
    PodCompletion,
    /// The Shipwright BuildRun finished
    BuildRunCompletion,
    /// The BuildConfig's `status.lastVersion` reached `expected_version`
    BuildConfigProgress {
        /// Build version the config must have reached
        expected_version: i64,
    },
}

impl Condition {
    /// Resource kind this condition is evaluated against
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::SecretExistence => ResourceKind::Secret,
            Self::PodCompletion => ResourceKind::Pod,
            Self::BuildRunCompletion => ResourceKind::BuildRun,
            Self::BuildConfigProgress { .. } => ResourceKind::BuildConfig,
        }
    }

    /// Evaluate the condition against one snapshot
    pub fn evaluate(&self, snapshot: &Snapshot) -> ConditionResult {
        match self {
            // Presence is the condition: a snapshot only exists if the fetch succeeded.
            Self::SecretExistence => ConditionResult::Satisfied,
            Self::PodCompletion => evaluate_pod(snapshot),
            Self::BuildRunCompletion => evaluate_build_run(snapshot),
            Self::BuildConfigProgress { expected_version } => {
                match snapshot.i64_at("/status/lastVersion") {
                    Some(v) if v >= *expected_version => ConditionResult::Satisfied,
                    _ => ConditionResult::Pending,
                }
            }
        }
    }
}

fn evaluate_pod(snapshot: &Snapshot) -> ConditionResult {
    match snapshot.str_at("/status/phase") {
        Some(POD_PHASE_SUCCEEDED) => ConditionResult::Satisfied,
        Some(POD_PHASE_FAILED) => {
            let name = snapshot.str_at("/metadata/name").unwrap_or("<unknown>");
            let namespace = snapshot.str_at("/metadata/namespace").unwrap_or("<unknown>");
            let mut message = format!("pod {}/{} failed", namespace, name);
            if let Some(reason) = snapshot.str_at("/status/reason") {
                message.push_str(&format!(" ({})", reason));
            }
            if let Some(detail) = snapshot.str_at("/status/message") {
                message.push_str(&format!(": {}", detail));
            }
            ConditionResult::failed(REASON_POD_FAILED, message)
        }
        // Pending, Running, Unknown, or not yet reported
        _ => ConditionResult::Pending,
    }
}

fn evaluate_build_run(snapshot: &Snapshot) -> ConditionResult {
    let Some(condition) = build_run_succeeded_condition(snapshot) else {
        return ConditionResult::Pending;
    };

    match condition.get("status").and_then(Value::as_str) {
        Some("True") => ConditionResult::Satisfied,
        None | Some("Unknown") => ConditionResult::Pending,
        Some(_) => {
            let field = |ptr: &str| snapshot.str_at(ptr).filter(|s| !s.is_empty());
            let cond_field = |name: &str| {
                condition
                    .get(name)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
            };

            let reason = field("/status/failureDetails/reason")
                .or_else(|| cond_field("reason"))
                .unwrap_or(REASON_BUILD_RUN_FAILED);
            let message = field("/status/failureDetails/message")
                .or_else(|| cond_field("message"))
                .unwrap_or_default();

            ConditionResult::failed(reason, message)
        }
    }
}

fn build_run_succeeded_condition(snapshot: &Snapshot) -> Option<&Value> {
    snapshot
        .pointer("/status/conditions")?
        .as_array()?
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some(BUILD_RUN_SUCCEEDED_CONDITION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod(phase: Option<&str>) -> Snapshot {
        let mut value = json!({
            "kind": "Pod",
            "metadata": {"name": "etc-pki-entitlement-test", "namespace": "openshift-config-managed"}
        });
        if let Some(phase) = phase {
            value["status"] = json!({ "phase": phase });
        }
        Snapshot::new(value)
    }

    fn build_run(status: Value) -> Snapshot {
        Snapshot::new(json!({
            "kind": "BuildRun",
            "metadata": {"name": "entitled-br", "namespace": "builds-test"},
            "status": status
        }))
    }

    // =========================================================================
    // SecretExistence
    // =========================================================================

    #[test]
    fn secret_is_satisfied_by_any_snapshot() {
        let snap = Snapshot::new(json!({"kind": "Secret", "metadata": {"name": "s"}}));
        assert_eq!(
            Condition::SecretExistence.evaluate(&snap),
            ConditionResult::Satisfied
        );
    }

    // =========================================================================
    // PodCompletion
    // =========================================================================

    #[test]
    fn pod_non_terminal_phases_are_pending() {
        for phase in [None, Some("Pending"), Some("Running"), Some("Unknown")] {
            assert_eq!(
                Condition::PodCompletion.evaluate(&pod(phase)),
                ConditionResult::Pending,
                "phase {:?}",
                phase
            );
        }
    }

    #[test]
    fn pod_succeeded_is_satisfied() {
        assert_eq!(
            Condition::PodCompletion.evaluate(&pod(Some("Succeeded"))),
            ConditionResult::Satisfied
        );
    }

    #[test]
    fn pod_failed_is_terminal_with_pod_failed_reason() {
        let ConditionResult::Failed { reason, message } =
            Condition::PodCompletion.evaluate(&pod(Some("Failed")))
        else {
            panic!("expected Failed");
        };
        assert_eq!(reason, REASON_POD_FAILED);
        assert_eq!(
            message,
            "pod openshift-config-managed/etc-pki-entitlement-test failed"
        );
    }

    #[test]
    fn pod_failed_message_includes_kubelet_detail() {
        let snap = Snapshot::new(json!({
            "metadata": {"name": "p", "namespace": "ns"},
            "status": {"phase": "Failed", "reason": "Evicted", "message": "low on memory"}
        }));
        let result = Condition::PodCompletion.evaluate(&snap);
        assert_eq!(
            result,
            ConditionResult::Failed {
                reason: REASON_POD_FAILED.to_string(),
                message: "pod ns/p failed (Evicted): low on memory".to_string(),
            }
        );
    }

    // =========================================================================
    // BuildRunCompletion
    // =========================================================================

    #[test]
    fn build_run_without_succeeded_condition_is_pending() {
        assert_eq!(
            Condition::BuildRunCompletion.evaluate(&build_run(json!({}))),
            ConditionResult::Pending
        );
        let other_only = build_run(json!({
            "conditions": [{"type": "Ready", "status": "False"}]
        }));
        assert_eq!(
            Condition::BuildRunCompletion.evaluate(&other_only),
            ConditionResult::Pending
        );
    }

    #[test]
    fn build_run_unknown_status_is_pending() {
        let snap = build_run(json!({
            "conditions": [{"type": "Succeeded", "status": "Unknown", "reason": "Running"}]
        }));
        assert_eq!(
            Condition::BuildRunCompletion.evaluate(&snap),
            ConditionResult::Pending
        );
    }

    #[test]
    fn build_run_true_is_satisfied() {
        let snap = build_run(json!({
            "conditions": [{"type": "Succeeded", "status": "True", "reason": "Succeeded"}]
        }));
        assert_eq!(
            Condition::BuildRunCompletion.evaluate(&snap),
            ConditionResult::Satisfied
        );
    }

    #[test]
    fn build_run_failure_uses_failure_details() {
        let snap = build_run(json!({
            "conditions": [{"type": "Succeeded", "status": "False", "reason": "Failed"}],
            "failureDetails": {"reason": "ImageBuildFailed", "message": "layer mismatch"}
        }));
        assert_eq!(
            Condition::BuildRunCompletion.evaluate(&snap),
            ConditionResult::Failed {
                reason: "ImageBuildFailed".to_string(),
                message: "layer mismatch".to_string(),
            }
        );
    }

    #[test]
    fn build_run_failure_falls_back_to_condition_fields() {
        let snap = build_run(json!({
            "conditions": [{
                "type": "Succeeded",
                "status": "False",
                "reason": "BuildRunTimeout",
                "message": "exceeded 10m"
            }]
        }));
        assert_eq!(
            Condition::BuildRunCompletion.evaluate(&snap),
            ConditionResult::Failed {
                reason: "BuildRunTimeout".to_string(),
                message: "exceeded 10m".to_string(),
            }
        );

        let bare = build_run(json!({
            "conditions": [{"type": "Succeeded", "status": "False"}]
        }));
        assert_eq!(
            Condition::BuildRunCompletion.evaluate(&bare),
            ConditionResult::Failed {
                reason: REASON_BUILD_RUN_FAILED.to_string(),
                message: String::new(),
            }
        );
    }

    // =========================================================================
    // BuildConfigProgress
    // =========================================================================

    #[test]
    fn build_config_waits_for_expected_version() {
        let condition = Condition::BuildConfigProgress {
            expected_version: 2,
        };
        let at = |v: Value| {
            Snapshot::new(json!({"kind": "BuildConfig", "status": {"lastVersion": v}}))
        };

        assert_eq!(
            condition.evaluate(&Snapshot::new(json!({"kind": "BuildConfig"}))),
            ConditionResult::Pending
        );
        assert_eq!(condition.evaluate(&at(json!(1))), ConditionResult::Pending);
        assert_eq!(condition.evaluate(&at(json!(2))), ConditionResult::Satisfied);
        assert_eq!(condition.evaluate(&at(json!(3))), ConditionResult::Satisfied);
    }

    #[test]
    fn condition_kinds() {
        assert_eq!(Condition::SecretExistence.kind(), ResourceKind::Secret);
        assert_eq!(Condition::PodCompletion.kind(), ResourceKind::Pod);
        assert_eq!(Condition::BuildRunCompletion.kind(), ResourceKind::BuildRun);
        assert_eq!(
            Condition::BuildConfigProgress {
                expected_version: 1
            }
            .kind(),
            ResourceKind::BuildConfig
        );
    }
}
