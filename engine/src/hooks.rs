//! Callbacks the orchestrator uses to ask a human (or a script) for approval.

use std::future::Future;
use std::pin::Pin;

use toolhost_types::{ApprovalDecision, ApprovalRequest, ApprovalResponse};

pub type ApprovalFut<'a> = Pin<Box<dyn Future<Output = ApprovalDecision> + Send + 'a>>;

/// Every method has a default; callers override what they care about. Without a
/// `request_approval` override every request is denied.
pub trait ApprovalHooks: Send + Sync {
    /// Fired before `request_approval`.
    fn on_approval_request(&self, _request: &ApprovalRequest) {}

    fn request_approval<'a>(&'a self, _request: &'a ApprovalRequest) -> ApprovalFut<'a> {
        Box::pin(async { ApprovalDecision::Deny })
    }

    /// Fired after the decision has been recorded.
    fn on_approval_response(&self, _response: &ApprovalResponse) {}
}

/// Default hooks: deny anything that needs approval.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ApprovalHooks for NoHooks {}

/// Answers every request with the same decision.
#[derive(Debug, Clone, Copy)]
pub struct StaticDecisionHooks(pub ApprovalDecision);

impl ApprovalHooks for StaticDecisionHooks {
    fn request_approval<'a>(&'a self, request: &'a ApprovalRequest) -> ApprovalFut<'a> {
        let decision = self.0;
        tracing::debug!(tool = %request.tool_name, ?decision, "Static approval decision");
        Box::pin(async move { decision })
    }
}
