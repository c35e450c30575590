// crates/core/src/auth.rs
//! Batch-level authentication failure detection.

use async_trait::async_trait;
use statboard_types::SourceKind;

use crate::batch::ResultBatch;

/// Ends the signed-in session (the external identity provider's sign-out).
#[async_trait]
pub trait SessionTerminator: Send + Sync {
    /// End the session of `identity_id`. A session that has since moved on to
    /// another identity must be left alone.
    async fn sign_out(&self, identity_id: &str);
}

/// Result of scanning one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthScan {
    pub auth_expired: bool,
    /// Sources that reported the failure, in batch order.
    pub sources: Vec<SourceKind>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AuthErrorHandler;

impl AuthErrorHandler {
    /// Look for 401/403-equivalent failures across every settled result.
    pub fn scan(&self, batch: &ResultBatch) -> AuthScan {
        let sources: Vec<SourceKind> = batch
            .iter()
            .filter(|r| matches!(&r.outcome, Err(e) if e.is_auth_failure()))
            .map(|r| r.source)
            .collect();
        AuthScan {
            auth_expired: !sources.is_empty(),
            sources,
        }
    }

    /// Scan the batch fetched for `identity_id` and, if credentials expired,
    /// sign that identity out exactly once no matter how many sources
    /// reported it.
    pub async fn handle(
        &self,
        batch: &ResultBatch,
        identity_id: &str,
        terminator: &dyn SessionTerminator,
    ) -> AuthScan {
        let scan = self.scan(batch);
        if scan.auth_expired {
            tracing::warn!(identity_id, sources = ?scan.sources, "Credentials rejected; ending session");
            terminator.sign_out(identity_id).await;
        }
        scan
    }
}
