//! Typing-presence signaling.
//!
//! Flags are plain booleans overwritten in place, one per conversation
//! role. There is no store-side expiry: a client that disconnects while
//! its flag is set leaves it set until the next write to the same path.
//! `TypingGuard` implements the idle-clear contract for well-behaved
//! in-process callers.

use crate::shared::error::Result;
use crate::shared::models::AuthorRole;
use crate::store::{Live, StoreEvent, TicketStore};
use log::debug;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How long after the last edit a typing flag is cleared. Protocol
/// constant shared by every client of the store.
pub const TYPING_IDLE: Duration = Duration::from_millis(2000);

/// Publishes and observes per-role typing flags.
#[derive(Clone)]
pub struct PresenceSignaler {
    store: TicketStore,
}

impl PresenceSignaler {
    pub fn new(store: TicketStore) -> Self {
        Self { store }
    }

    /// Overwrite a role's typing flag.
    pub async fn set_typing(
        &self,
        owner_id: Uuid,
        ticket_id: Uuid,
        role: AuthorRole,
        is_typing: bool,
    ) -> Result<()> {
        self.store
            .set_typing(owner_id, ticket_id, role, is_typing)
            .await
    }

    /// Live view of one role's flag: current value on subscription, then
    /// every change. Ends when the ticket is deleted.
    pub fn observe_typing(&self, owner_id: Uuid, ticket_id: Uuid, role: AuthorRole) -> Live<bool> {
        self.store.live_view(
            move |event| {
                matches!(
                    *event,
                    StoreEvent::TypingChanged {
                        owner_id: o,
                        ticket_id: t,
                        role: r,
                    } if o == owner_id && t == ticket_id && r == role
                ) || matches!(
                    *event,
                    StoreEvent::TicketRemoved {
                        owner_id: o,
                        ticket_id: t,
                    } if o == owner_id && t == ticket_id
                )
            },
            move |store: TicketStore| async move {
                store.typing(owner_id, ticket_id, role).await.ok()
            },
        )
    }

    /// Debouncing helper for one role's flag, using the protocol idle
    /// window.
    pub fn guard(&self, owner_id: Uuid, ticket_id: Uuid, role: AuthorRole) -> TypingGuard {
        TypingGuard {
            store: self.store.clone(),
            owner_id,
            ticket_id,
            role,
            idle: TYPING_IDLE,
            pending: Mutex::new(None),
        }
    }
}

/// Keeps a typing flag true while edits keep arriving and clears it after
/// the idle window.
///
/// Each [`touch`](Self::touch) sets the flag and re-arms the delayed
/// clear, cancelling the previous one. Dropping the guard leaves any
/// pending clear running; a process that dies abruptly leaves the flag
/// stuck true until someone writes the path again.
pub struct TypingGuard {
    store: TicketStore,
    owner_id: Uuid,
    ticket_id: Uuid,
    role: AuthorRole,
    idle: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl TypingGuard {
    /// Replace the idle window. Tests shorten it; production callers keep
    /// [`TYPING_IDLE`].
    pub fn with_idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    /// Record one edit: flag goes true now, false after the idle window
    /// unless another edit arrives first.
    pub async fn touch(&self) -> Result<()> {
        let mut pending = self.pending.lock().await;
        if let Some(armed) = pending.take() {
            armed.abort();
        }
        self.store
            .set_typing(self.owner_id, self.ticket_id, self.role, true)
            .await?;
        let store = self.store.clone();
        let (owner_id, ticket_id, role, idle) =
            (self.owner_id, self.ticket_id, self.role, self.idle);
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            if let Err(err) = store.set_typing(owner_id, ticket_id, role, false).await {
                debug!("idle typing clear skipped: {err}");
            }
        }));
        Ok(())
    }

    /// Clear the flag immediately and disarm any pending clear.
    pub async fn stop(&self) -> Result<()> {
        let mut pending = self.pending.lock().await;
        if let Some(armed) = pending.take() {
            armed.abort();
        }
        self.store
            .set_typing(self.owner_id, self.ticket_id, self.role, false)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{Ticket, TicketCategory, TicketPriority, TicketStatus};
    use crate::tests::test_util;
    use chrono::Utc;

    async fn seeded() -> (PresenceSignaler, TicketStore, Uuid, Uuid) {
        let store = TicketStore::default();
        let owner_id = Uuid::new_v4();
        let now = Utc::now();
        let ticket = store
            .insert_ticket(Ticket {
                id: Uuid::new_v4(),
                protocol: "CH-RH-0-0000".into(),
                owner_id,
                requester_name: "Ana Souza".into(),
                requester_email: "ana@example.com".into(),
                category: TicketCategory::Rh,
                priority: TicketPriority::Baixa,
                description: "Dúvida sobre férias acumuladas".into(),
                status: TicketStatus::Open,
                created_at: now,
                updated_at: now,
                rating: None,
            })
            .await
            .unwrap();
        (
            PresenceSignaler::new(store.clone()),
            store,
            owner_id,
            ticket.id,
        )
    }

    #[tokio::test]
    async fn observe_replays_then_follows_writes() {
        test_util::setup();
        let (presence, _, owner, ticket) = seeded().await;
        let mut live = presence.observe_typing(owner, ticket, AuthorRole::Agent);
        assert_eq!(live.next().await, Some(false));

        presence
            .set_typing(owner, ticket, AuthorRole::Agent, true)
            .await
            .unwrap();
        assert_eq!(live.next().await, Some(true));

        presence
            .set_typing(owner, ticket, AuthorRole::Agent, false)
            .await
            .unwrap();
        assert_eq!(live.next().await, Some(false));
    }

    #[tokio::test]
    async fn roles_do_not_observe_each_other() {
        let (presence, _, owner, ticket) = seeded().await;
        let mut agent_view = presence.observe_typing(owner, ticket, AuthorRole::Agent);
        assert_eq!(agent_view.next().await, Some(false));

        presence
            .set_typing(owner, ticket, AuthorRole::Requester, true)
            .await
            .unwrap();
        presence
            .set_typing(owner, ticket, AuthorRole::Agent, true)
            .await
            .unwrap();
        // The requester write is filtered out; the first delivery is the
        // agent's own change.
        assert_eq!(agent_view.next().await, Some(true));
    }

    #[tokio::test]
    async fn guard_clears_after_the_idle_window() {
        let (presence, store, owner, ticket) = seeded().await;
        let guard = presence
            .guard(owner, ticket, AuthorRole::Requester)
            .with_idle(Duration::from_millis(50));

        guard.touch().await.unwrap();
        assert!(store
            .typing(owner, ticket, AuthorRole::Requester)
            .await
            .unwrap());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!store
            .typing(owner, ticket, AuthorRole::Requester)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn fresh_edits_rearm_the_pending_clear() {
        let (presence, store, owner, ticket) = seeded().await;
        let guard = presence
            .guard(owner, ticket, AuthorRole::Requester)
            .with_idle(Duration::from_millis(300));

        guard.touch().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        guard.touch().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        // 350ms elapsed since the first touch, but only 150ms since the
        // second; the flag must still be up.
        assert!(store
            .typing(owner, ticket, AuthorRole::Requester)
            .await
            .unwrap());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!store
            .typing(owner, ticket, AuthorRole::Requester)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn stop_clears_immediately() {
        let (presence, store, owner, ticket) = seeded().await;
        let guard = presence
            .guard(owner, ticket, AuthorRole::Agent)
            .with_idle(Duration::from_secs(60));
        guard.touch().await.unwrap();
        guard.stop().await.unwrap();
        assert!(!store.typing(owner, ticket, AuthorRole::Agent).await.unwrap());
    }
}
