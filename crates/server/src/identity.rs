// crates/server/src/identity.rs
//! Signed-in identity, as seen by the dashboard.
//!
//! Authentication itself lives in an external identity provider. The server
//! only holds the identity id and bearer token the provider handed over.

use std::sync::RwLock;

use async_trait::async_trait;
use statboard_core::SessionTerminator;

/// Read side of the identity provider.
pub trait IdentityProvider: Send + Sync {
    /// `false` while the provider is still resolving the session; no fetch
    /// may start until it reports ready.
    fn is_ready(&self) -> bool;

    fn current_identity(&self) -> Option<String>;

    /// Bearer token for `identity_id`, read together with the identity so a
    /// concurrent sign-in can never pair one identity with another's token.
    /// `None` when someone else (or nobody) is signed in.
    fn access_token_for(&self, identity_id: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    identity_id: String,
    access_token: String,
}

/// In-process session slot filled by `POST /api/session`.
#[derive(Debug, Default)]
pub struct SessionIdentity {
    session: RwLock<Option<Session>>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(identity_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        let identity = Self::new();
        identity.sign_in(identity_id, access_token);
        identity
    }

    pub fn sign_in(&self, identity_id: impl Into<String>, access_token: impl Into<String>) {
        let session = Session {
            identity_id: identity_id.into(),
            access_token: access_token.into(),
        };
        match self.session.write() {
            Ok(mut slot) => *slot = Some(session),
            Err(e) => tracing::error!("RwLock poisoned storing session: {e}"),
        }
    }

    /// Forget the session. Returns the identity that was signed in, if any.
    pub fn clear(&self) -> Option<String> {
        match self.session.write() {
            Ok(mut slot) => slot.take().map(|s| s.identity_id),
            Err(e) => {
                tracing::error!("RwLock poisoned clearing session: {e}");
                None
            }
        }
    }

    /// Forget the session only if it still belongs to `identity_id`.
    pub fn clear_if(&self, identity_id: &str) -> bool {
        match self.session.write() {
            Ok(mut slot) => {
                if slot.as_ref().is_some_and(|s| s.identity_id == identity_id) {
                    *slot = None;
                    true
                } else {
                    false
                }
            }
            Err(e) => {
                tracing::error!("RwLock poisoned clearing session: {e}");
                false
            }
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Session) -> T) -> Option<T> {
        match self.session.read() {
            Ok(slot) => slot.as_ref().map(f),
            Err(e) => {
                tracing::error!("RwLock poisoned reading session: {e}");
                None
            }
        }
    }
}

impl IdentityProvider for SessionIdentity {
    fn is_ready(&self) -> bool {
        self.read(|_| ()).is_some()
    }

    fn current_identity(&self) -> Option<String> {
        self.read(|s| s.identity_id.clone())
    }

    fn access_token_for(&self, identity_id: &str) -> Option<String> {
        self.read(|s| (s.identity_id == identity_id).then(|| s.access_token.clone()))
            .flatten()
    }
}

/// Expired credentials end the stored session; the next request gets a 401
/// and the client re-authenticates with the provider.
#[async_trait]
impl SessionTerminator for SessionIdentity {
    async fn sign_out(&self, identity_id: &str) {
        if self.clear_if(identity_id) {
            tracing::info!(identity_id, "Session ended after credential rejection");
        } else {
            tracing::debug!(identity_id, "Credential rejection for a session that already ended");
        }
    }
}
