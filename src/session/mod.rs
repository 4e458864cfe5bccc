//! Explicit session state. Components receive a `SessionContext` at
//! construction instead of reading ambient globals; the presentation layer
//! sets it at sign-in and clears it at sign-out.

use crate::shared::error::{HelpdeskError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// What the identity provider supplies about the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
}

/// Shared handle to the current user identity. Cheap to clone; all clones
/// observe the same sign-in state.
#[derive(Clone)]
pub struct SessionContext {
    current: Arc<watch::Sender<Option<UserIdentity>>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    /// A signed-out session.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            current: Arc::new(tx),
        }
    }

    /// A session already signed in as `user`.
    pub fn signed_in(user: UserIdentity) -> Self {
        let (tx, _) = watch::channel(Some(user));
        Self {
            current: Arc::new(tx),
        }
    }

    pub fn sign_in(&self, user: UserIdentity) {
        log::info!("session signed in: {}", user.id);
        self.current.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        log::info!("session signed out");
        self.current.send_replace(None);
    }

    pub fn current_user(&self) -> Option<UserIdentity> {
        self.current.borrow().clone()
    }

    /// The current user, or `Unauthenticated` when signed out.
    pub fn require_user(&self) -> Result<UserIdentity> {
        self.current_user().ok_or(HelpdeskError::Unauthenticated)
    }

    /// Change notifications for sign-in and sign-out. The receiver sees the
    /// state as of subscription, then every change.
    pub fn watch(&self) -> watch::Receiver<Option<UserIdentity>> {
        self.current.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserIdentity {
        UserIdentity {
            id: Uuid::new_v4(),
            display_name: "Ana Souza".into(),
            email: "ana@example.com".into(),
        }
    }

    #[test]
    fn starts_signed_out_and_requires_a_user() {
        let session = SessionContext::new();
        assert_eq!(session.current_user(), None);
        assert!(matches!(
            session.require_user(),
            Err(HelpdeskError::Unauthenticated)
        ));
    }

    #[test]
    fn sign_in_and_out_are_visible_to_every_clone() {
        let session = SessionContext::new();
        let other = session.clone();
        let ana = user();
        session.sign_in(ana.clone());
        assert_eq!(other.current_user(), Some(ana));
        other.sign_out();
        assert_eq!(session.current_user(), None);
    }

    #[tokio::test]
    async fn watch_observes_sign_in_changes() {
        let session = SessionContext::new();
        let mut rx = session.watch();
        assert!(rx.borrow().is_none());

        let ana = user();
        session.sign_in(ana.clone());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref(), Some(&ana));

        session.sign_out();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }
}
