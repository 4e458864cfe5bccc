//! Conversation synchronizer: a single ticket's live transcript plus
//! status-gated sends.

use crate::shared::error::{HelpdeskError, Result};
use crate::shared::models::{AuthorRole, Message, TicketStatus};
use crate::store::{Live, StoreEvent, TicketStore};
use log::warn;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// An open conversation session over one ticket.
///
/// The parent ticket's status is watched continuously for as long as the
/// session is open: a ticket closed from anywhere immediately disables
/// further sends here, and the settlement check inside the store rejects
/// sends that were already in flight when the close committed.
pub struct Conversation {
    store: TicketStore,
    owner_id: Uuid,
    ticket_id: Uuid,
    role: AuthorRole,
    status: watch::Receiver<TicketStatus>,
    status_task: JoinHandle<()>,
}

impl Conversation {
    /// Open a session on `tickets/{owner_id}/{ticket_id}` as `role`. The
    /// role decides the author of every message sent through this handle.
    pub async fn open(
        store: &TicketStore,
        owner_id: Uuid,
        ticket_id: Uuid,
        role: AuthorRole,
    ) -> Result<Conversation> {
        let initial = store.ticket(owner_id, ticket_id).await?.status;
        let (tx, rx) = watch::channel(initial);
        let mut bus = store.subscribe();
        let watcher = store.clone();
        let status_task = tokio::spawn(async move {
            loop {
                match bus.recv().await {
                    Ok(event) if event.concerns_ticket(owner_id, ticket_id) => {}
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                match watcher.ticket(owner_id, ticket_id).await {
                    Ok(ticket) => {
                        tx.send_replace(ticket.status);
                    }
                    // Ticket deleted under the session; nothing left to track.
                    Err(_) => break,
                }
            }
        });
        Ok(Self {
            store: store.clone(),
            owner_id,
            ticket_id,
            role,
            status: rx,
            status_task,
        })
    }

    pub fn ticket_id(&self) -> Uuid {
        self.ticket_id
    }

    pub fn role(&self) -> AuthorRole {
        self.role
    }

    /// The most recently observed ticket status.
    pub fn status(&self) -> TicketStatus {
        *self.status.borrow()
    }

    /// Watch the parent ticket's status alongside the transcript.
    pub fn status_watch(&self) -> watch::Receiver<TicketStatus> {
        self.status.clone()
    }

    /// Live transcript: the full message list, re-sorted by `sent_at`
    /// ascending on every change. The sort is stable, so same-instant
    /// messages keep arrival order. Can be called repeatedly; each call is
    /// an independent restartable view.
    pub fn messages(&self) -> Live<Vec<Message>> {
        let owner_id = self.owner_id;
        let ticket_id = self.ticket_id;
        self.store.live_view(
            move |event| {
                matches!(
                    event,
                    StoreEvent::MessageAppended { .. } | StoreEvent::TicketRemoved { .. }
                ) && event.concerns_ticket(owner_id, ticket_id)
            },
            move |store: TicketStore| async move {
                match store.messages_of(owner_id, ticket_id).await {
                    Ok(mut messages) => {
                        messages.sort_by_key(|m| m.sent_at);
                        Some(messages)
                    }
                    Err(_) => None,
                }
            },
        )
    }

    /// Append a message as this session's role. Rejected with `ChatClosed`
    /// once the ticket is Closed, with `Validation` when the text trims to
    /// empty. A successful send clears this role's typing flag.
    pub async fn send(&self, text: &str) -> Result<Message> {
        if self.status() == TicketStatus::Closed {
            return Err(HelpdeskError::ChatClosed);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(HelpdeskError::validation("text", "must not be empty"));
        }
        let message = self
            .store
            .append_message(self.owner_id, self.ticket_id, self.role, text.to_string())
            .await?;
        if let Err(err) = self
            .store
            .set_typing(self.owner_id, self.ticket_id, self.role, false)
            .await
        {
            warn!("typing flag not cleared after send: {err}");
        }
        Ok(message)
    }

    /// Tear down the status watcher. Idempotent; dropping the session does
    /// the same.
    pub fn close(&self) {
        self.status_task.abort();
    }
}

impl Drop for Conversation {
    fn drop(&mut self) {
        self.status_task.abort();
    }
}
