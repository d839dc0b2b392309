//! Approval policy: when to ask before a tool runs, and what has been granted.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use sha2::{Digest, Sha256};
use toolhost_tools::ToolRegistry;
use toolhost_types::{ApprovalCheck, ApprovalDecision, ApprovalMode, RiskLevel};

/// Tools that run arbitrary commands; mutating calls to them are high risk.
const EXEC_TOOLS: &[&str] = &["exec_command", "write_stdin"];

const FINGERPRINT_HEX_LEN: usize = 16;

/// Decides whether a call needs a human decision and remembers the answers.
pub trait ApprovalManager: Send + Sync {
    fn check(&self, tool_name: &str, input: &Value) -> ApprovalCheck;
    fn record_decision(&self, fingerprint: &str, decision: ApprovalDecision);
    /// Forget one-shot grants that were never used.
    fn clear_once_approvals(&self);
    /// Forget everything.
    fn dispose(&self);
}

/// Approval mode plus the tool names that must always be asked about.
#[derive(Debug, Clone, Default)]
pub struct ApprovalPolicy {
    pub mode: ApprovalMode,
    pub denylist: HashSet<String>,
}

impl ApprovalPolicy {
    #[must_use]
    pub fn is_denylisted(&self, tool: &str) -> bool {
        self.denylist.contains(tool)
    }
}

#[derive(Debug, Default)]
struct Grants {
    once: HashSet<String>,
    session: HashSet<String>,
}

/// Reference [`ApprovalManager`] driven by an [`ApprovalPolicy`] and the registry's
/// mutating flags.
#[derive(Debug)]
pub struct PolicyApprovalManager {
    policy: ApprovalPolicy,
    /// Tool name to `is_mutating`.
    tools: HashMap<String, bool>,
    grants: Mutex<Grants>,
}

impl PolicyApprovalManager {
    #[must_use]
    pub fn new(policy: ApprovalPolicy, registry: &ToolRegistry) -> Self {
        let tools = registry
            .definitions()
            .into_iter()
            .map(|def| (def.name, def.mutating))
            .collect();
        Self {
            policy,
            tools,
            grants: Mutex::new(Grants::default()),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    fn grants(&self) -> std::sync::MutexGuard<'_, Grants> {
        self.grants.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume a once grant or find a session grant.
    fn take_grant(&self, fingerprint: &str) -> Option<&'static str> {
        let mut grants = self.grants();
        if grants.session.contains(fingerprint) {
            return Some("approved for this session");
        }
        if grants.once.remove(fingerprint) {
            return Some("approved once");
        }
        None
    }
}

fn risk_level(tool_name: &str, mutating: bool) -> RiskLevel {
    if !mutating {
        RiskLevel::Low
    } else if EXEC_TOOLS.contains(&tool_name) {
        RiskLevel::High
    } else {
        RiskLevel::Medium
    }
}

impl ApprovalManager for PolicyApprovalManager {
    fn check(&self, tool_name: &str, input: &Value) -> ApprovalCheck {
        let fingerprint = fingerprint(tool_name, input);
        let known = self.tools.get(tool_name).copied();
        let risk_level = risk_level(tool_name, known.unwrap_or(true));

        let (need_approval, reason) = match known {
            // Unknown names end as tool_not_found without a prompt.
            None => (false, "unknown tool".to_string()),
            Some(_) if self.policy.is_denylisted(tool_name) => {
                (true, format!("tool '{tool_name}' is denylisted"))
            }
            Some(mutating) => match self.policy.mode {
                ApprovalMode::Auto => (false, "auto approval mode".to_string()),
                ApprovalMode::Strict => (true, "strict mode asks for every tool".to_string()),
                ApprovalMode::Default if !mutating => (false, "read-only tool".to_string()),
                ApprovalMode::Default => match self.take_grant(&fingerprint) {
                    Some(grant) => (false, grant.to_string()),
                    None => (true, format!("{tool_name} modifies state")),
                },
            },
        };

        if need_approval {
            tracing::debug!(tool = tool_name, %fingerprint, %risk_level, %reason, "Approval required");
        }
        ApprovalCheck {
            need_approval,
            tool_name: tool_name.to_string(),
            params: input.clone(),
            fingerprint,
            risk_level,
            reason,
        }
    }

    fn record_decision(&self, fingerprint: &str, decision: ApprovalDecision) {
        let mut grants = self.grants();
        match decision {
            ApprovalDecision::Once => {
                grants.once.insert(fingerprint.to_string());
            }
            ApprovalDecision::Session => {
                grants.session.insert(fingerprint.to_string());
            }
            ApprovalDecision::Deny => {
                grants.once.remove(fingerprint);
                grants.session.remove(fingerprint);
            }
        }
    }

    fn clear_once_approvals(&self) {
        self.grants().once.clear();
    }

    fn dispose(&self) {
        let mut grants = self.grants();
        grants.once.clear();
        grants.session.clear();
    }
}

/// First 16 hex chars of `sha256(tool_name || ":" || canonical_json(input))`.
#[must_use]
pub fn fingerprint(tool_name: &str, input: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(input, &mut canonical);
    let mut hasher = Sha256::new();
    hasher.update(tool_name.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(FINGERPRINT_HEX_LEN);
    for byte in digest.iter().take(FINGERPRINT_HEX_LEN / 2) {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// JSON with object keys sorted at every level.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
