//! The Key Transparency audit gate.
//!
//! Before a candidate Signed Key List is submitted, the gate may hand
//! it to the Key Transparency self-audit for comparison against the
//! scope's last externally verified state. The audit engine itself
//! lives outside this workspace; only its verification result contract
//! is consumed here, through the [`KtVerifier`] capability.
//!
//! The gate is optional: with no KT context supplied it passes every
//! candidate through. When a context is supplied it fails closed — a
//! state that cannot be verified is treated exactly like one that
//! failed verification, and a failed decision is terminal for the
//! enclosing mutation (no retry happens here).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use havenmail_types::skl::SignedKeyList;
use havenmail_types::{HavenmailError, KeyScope, Result};

// ---------------------------------------------------------------------------
// Self-audit state
// ---------------------------------------------------------------------------

/// Cached result of the last completed self-audit for a scope.
#[derive(Clone, Debug)]
pub struct SelfAuditResult {
    /// Canonical `Data` of the last list the audit verified.
    pub verified_data: String,
    /// Last transparency epoch the verified list was published in.
    pub max_epoch_id: Option<u64>,
}

/// Key Transparency state handed to the gate by the caller.
#[derive(Clone, Debug, Default)]
pub struct KtState {
    /// Last completed self-audit result, if one exists.
    pub self_audit_result: Option<SelfAuditResult>,
    /// When the last self-audit finished.
    pub last_self_audit: Option<DateTime<Utc>>,
    /// Set while a self-audit is currently running.
    pub is_running: bool,
}

// ---------------------------------------------------------------------------
// Verifier capability
// ---------------------------------------------------------------------------

/// Status reported by the audit capability.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KtStatus {
    /// Candidate is consistent with the verified history.
    Passed,
    /// Candidate diverges from the verified history.
    Failed,
    /// The audit could not establish a verified state to compare
    /// against. Treated like [`KtStatus::Failed`] by the gate.
    Unverifiable,
}

/// Result of one verification call.
#[derive(Clone, Debug)]
pub struct KtOutcome {
    /// Verification status.
    pub status: KtStatus,
    /// Advisory message to surface to the user (may be empty).
    pub message: String,
    /// Error detail for non-passed outcomes.
    pub error: Option<String>,
}

/// The external Key Transparency verification capability.
///
/// Implementations own their network access; the gate only consumes
/// the result.
#[async_trait]
pub trait KtVerifier {
    /// Compares `candidate` for `scope` against the last verified
    /// state, consulting the transparency log as needed.
    async fn verify_self_audit(
        &self,
        scope: &KeyScope,
        candidate: &SignedKeyList,
        state: &KtState,
    ) -> KtOutcome;
}

/// KT context: cached state plus the verifier capability.
pub struct KtContext<V> {
    /// Cached self-audit state for the account.
    pub state: KtState,
    /// The verification capability.
    pub verifier: V,
}

/// Placeholder verifier for callers that run without Key Transparency.
///
/// Lets `None::<&KtContext<NoKtVerifier>>` satisfy the generic bound;
/// the gate never invokes it on the `None` path.
pub struct NoKtVerifier;

#[async_trait]
impl KtVerifier for NoKtVerifier {
    async fn verify_self_audit(
        &self,
        _scope: &KeyScope,
        _candidate: &SignedKeyList,
        _state: &KtState,
    ) -> KtOutcome {
        KtOutcome {
            status: KtStatus::Passed,
            message: String::new(),
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AuditDecision
// ---------------------------------------------------------------------------

/// Outcome of gating one candidate manifest.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuditDecision {
    /// Candidate may be submitted. The advisory message is surfaced to
    /// the caller but never blocks the mutation.
    Ok {
        /// Advisory from the audit (empty when KT is disabled).
        message: String,
    },
    /// Candidate is vetoed; the enclosing mutation must abort with all
    /// state untouched.
    Failed {
        /// Error reported by the audit.
        error: String,
    },
}

impl AuditDecision {
    /// Converts the decision into the mutation's result, labelling the
    /// failure with the action that was attempted.
    pub fn into_advisory(self, action: &str) -> Result<String> {
        match self {
            Self::Ok { message } => Ok(message),
            Self::Failed { error } => Err(HavenmailError::AuditFailed {
                reason: format!("cannot {action}: {error}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Gates a candidate Signed Key List through the KT self-audit.
///
/// Pass-through when `kt` is `None`. Otherwise the verifier's outcome
/// is mapped fail-closed: both `Failed` and `Unverifiable` veto the
/// candidate.
pub async fn audit_candidate<V>(
    scope: &KeyScope,
    candidate: &SignedKeyList,
    kt: Option<&KtContext<V>>,
) -> AuditDecision
where
    V: KtVerifier + Sync,
{
    let Some(context) = kt else {
        return AuditDecision::Ok {
            message: String::new(),
        };
    };

    let outcome = context
        .verifier
        .verify_self_audit(scope, candidate, &context.state)
        .await;

    match outcome.status {
        KtStatus::Passed => AuditDecision::Ok {
            message: outcome.message,
        },
        KtStatus::Failed => AuditDecision::Failed {
            error: outcome
                .error
                .unwrap_or_else(|| "signed key list diverges from verified state".into()),
        },
        KtStatus::Unverifiable => AuditDecision::Failed {
            error: outcome
                .error
                .unwrap_or_else(|| "key transparency state could not be verified".into()),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedVerifier(KtStatus);

    #[async_trait]
    impl KtVerifier for FixedVerifier {
        async fn verify_self_audit(
            &self,
            _scope: &KeyScope,
            _candidate: &SignedKeyList,
            _state: &KtState,
        ) -> KtOutcome {
            KtOutcome {
                status: self.0,
                message: "advisory".into(),
                error: Some("divergence detected".into()),
            }
        }
    }

    fn candidate() -> SignedKeyList {
        SignedKeyList {
            data: "[]".into(),
            signature: "00".into(),
        }
    }

    fn context(status: KtStatus) -> KtContext<FixedVerifier> {
        KtContext {
            state: KtState::default(),
            verifier: FixedVerifier(status),
        }
    }

    #[tokio::test]
    async fn no_context_is_pass_through() {
        let decision = audit_candidate(
            &KeyScope::Account,
            &candidate(),
            None::<&KtContext<NoKtVerifier>>,
        )
        .await;
        assert_eq!(decision, AuditDecision::Ok { message: String::new() });
    }

    #[tokio::test]
    async fn passed_carries_advisory() {
        let kt = context(KtStatus::Passed);
        let decision = audit_candidate(&KeyScope::Account, &candidate(), Some(&kt)).await;
        assert_eq!(
            decision,
            AuditDecision::Ok {
                message: "advisory".into()
            }
        );
    }

    #[tokio::test]
    async fn failed_vetoes() {
        let kt = context(KtStatus::Failed);
        let decision = audit_candidate(&KeyScope::Account, &candidate(), Some(&kt)).await;
        assert!(matches!(decision, AuditDecision::Failed { .. }));
    }

    #[tokio::test]
    async fn unverifiable_fails_closed() {
        let kt = context(KtStatus::Unverifiable);
        let decision = audit_candidate(&KeyScope::Account, &candidate(), Some(&kt)).await;
        assert!(matches!(decision, AuditDecision::Failed { .. }));
    }

    #[test]
    fn into_advisory_labels_the_action() {
        let err = AuditDecision::Failed {
            error: "boom".into(),
        }
        .into_advisory("delete key")
        .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("cannot delete key"));
        assert!(text.contains("boom"));
    }
}
