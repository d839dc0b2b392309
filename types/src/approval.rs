use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Risk level reported with approval prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        })
    }
}

/// How eagerly the approval policy asks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    /// Never ask.
    Auto,
    /// Ask for mutating tools unless a grant covers the call.
    #[default]
    Default,
    /// Ask for every call; grants are ignored.
    Strict,
}

impl std::str::FromStr for ApprovalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ApprovalMode::Auto),
            "default" => Ok(ApprovalMode::Default),
            "strict" => Ok(ApprovalMode::Strict),
            other => Err(format!(
                "unknown approval mode '{other}' (expected auto, default, or strict)"
            )),
        }
    }
}

/// Decision returned by an approval round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    /// Approve this one call.
    Once,
    /// Approve this fingerprint for the rest of the session.
    Session,
    Deny,
}

impl ApprovalDecision {
    #[must_use]
    pub fn is_deny(self) -> bool {
        matches!(self, ApprovalDecision::Deny)
    }
}

/// Answer of `ApprovalManager::check`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalCheck {
    pub need_approval: bool,
    pub tool_name: String,
    pub params: Value,
    /// Stable identifier of (tool, input), used to remember session grants.
    pub fingerprint: String,
    pub risk_level: RiskLevel,
    pub reason: String,
}

/// Payload handed to approval hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub action_id: String,
    pub tool_name: String,
    pub params: Value,
    pub fingerprint: String,
    pub risk_level: RiskLevel,
    pub reason: String,
}

impl ApprovalRequest {
    #[must_use]
    pub fn from_check(action_id: impl Into<String>, check: &ApprovalCheck) -> Self {
        Self {
            action_id: action_id.into(),
            tool_name: check.tool_name.clone(),
            params: check.params.clone(),
            fingerprint: check.fingerprint.clone(),
            risk_level: check.risk_level,
            reason: check.reason.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    pub action_id: String,
    pub fingerprint: String,
    pub decision: ApprovalDecision,
}
