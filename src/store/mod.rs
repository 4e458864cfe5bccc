//! Push-notify tree store backing every engine component.
//!
//! The tree is addressed the way observers have always seen it:
//!
//! ```text
//! tickets/{ownerId}/{ticketId}                       ticket fields
//! tickets/{ownerId}/{ticketId}/messages/{messageId}  message fields
//! tickets/{ownerId}/{ticketId}/typingStatus/{role}   bool
//! tickets/{ownerId}/{ticketId}/rating                rating fields
//! profiles/{ownerId}                                 profile fields
//! ```
//!
//! Every logical mutation is one atomic field-group write under the tree
//! lock; concurrent writers to the same field path get last-write-wins.
//! Committed writes publish a [`StoreEvent`] on a broadcast bus, and live
//! views recompute from the full tree on every matching event, which makes
//! them restartable and tolerant of bus lag.

mod live;

pub use live::Live;

use crate::config::EngineConfig;
use crate::shared::error::{HelpdeskError, Result};
use crate::shared::models::{AuthorRole, Message, Ticket, TicketStatus, UserProfile};
use chrono::Utc;
use futures::Stream;
use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use uuid::Uuid;

/// Change notification published after every committed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    TicketUpserted { owner_id: Uuid, ticket_id: Uuid },
    TicketRemoved { owner_id: Uuid, ticket_id: Uuid },
    MessageAppended { owner_id: Uuid, ticket_id: Uuid },
    TypingChanged {
        owner_id: Uuid,
        ticket_id: Uuid,
        role: AuthorRole,
    },
    ProfileSaved { owner_id: Uuid },
}

impl StoreEvent {
    pub fn owner_id(&self) -> Uuid {
        match *self {
            StoreEvent::TicketUpserted { owner_id, .. }
            | StoreEvent::TicketRemoved { owner_id, .. }
            | StoreEvent::MessageAppended { owner_id, .. }
            | StoreEvent::TypingChanged { owner_id, .. }
            | StoreEvent::ProfileSaved { owner_id } => owner_id,
        }
    }

    pub fn ticket_id(&self) -> Option<Uuid> {
        match *self {
            StoreEvent::TicketUpserted { ticket_id, .. }
            | StoreEvent::TicketRemoved { ticket_id, .. }
            | StoreEvent::MessageAppended { ticket_id, .. }
            | StoreEvent::TypingChanged { ticket_id, .. } => Some(ticket_id),
            StoreEvent::ProfileSaved { .. } => None,
        }
    }

    pub fn concerns_ticket(&self, owner_id: Uuid, ticket_id: Uuid) -> bool {
        self.owner_id() == owner_id && self.ticket_id() == Some(ticket_id)
    }
}

struct TicketNode {
    ticket: Ticket,
    /// Arrival order; transcript views re-sort by `sent_at` and keep this
    /// order for ties.
    messages: Vec<Message>,
    typing: HashMap<AuthorRole, bool>,
}

impl TicketNode {
    fn new(ticket: Ticket) -> Self {
        Self {
            ticket,
            messages: Vec::new(),
            typing: HashMap::new(),
        }
    }
}

#[derive(Default)]
struct Tree {
    tickets: HashMap<Uuid, BTreeMap<Uuid, TicketNode>>,
    profiles: HashMap<Uuid, UserProfile>,
}

impl Tree {
    fn node(&self, owner_id: Uuid, ticket_id: Uuid) -> Result<&TicketNode> {
        self.tickets
            .get(&owner_id)
            .and_then(|nodes| nodes.get(&ticket_id))
            .ok_or_else(|| HelpdeskError::NotFound(format!("tickets/{owner_id}/{ticket_id}")))
    }

    fn node_mut(&mut self, owner_id: Uuid, ticket_id: Uuid) -> Result<&mut TicketNode> {
        self.tickets
            .get_mut(&owner_id)
            .and_then(|nodes| nodes.get_mut(&ticket_id))
            .ok_or_else(|| HelpdeskError::NotFound(format!("tickets/{owner_id}/{ticket_id}")))
    }
}

/// The single shared mutable resource of the engine. Cheap to clone; all
/// clones observe the same tree and event bus.
#[derive(Clone)]
pub struct TicketStore {
    tree: Arc<RwLock<Tree>>,
    events: broadcast::Sender<StoreEvent>,
    live_depth: usize,
}

impl Default for TicketStore {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl TicketStore {
    pub fn new(config: &EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_bus_capacity);
        Self {
            tree: Arc::new(RwLock::new(Tree::default())),
            events,
            live_depth: config.live_channel_depth,
        }
    }

    fn emit(&self, event: StoreEvent) {
        // No receivers is fine; views subscribe lazily.
        let _ = self.events.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Raw change feed as an async stream. Bus lag drops events but never
    /// values read afterwards, since consumers re-read the tree.
    pub fn events(&self) -> impl Stream<Item = StoreEvent> + Send {
        let mut rx = self.events.subscribe();
        async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("store event stream lagged, skipped {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    // ---- tickets ----

    pub(crate) async fn insert_ticket(&self, ticket: Ticket) -> Result<Ticket> {
        let owner_id = ticket.owner_id;
        let ticket_id = ticket.id;
        {
            let mut tree = self.tree.write().await;
            tree.tickets
                .entry(owner_id)
                .or_default()
                .insert(ticket_id, TicketNode::new(ticket.clone()));
        }
        debug!("inserted tickets/{owner_id}/{ticket_id}");
        self.emit(StoreEvent::TicketUpserted {
            owner_id,
            ticket_id,
        });
        Ok(ticket)
    }

    pub(crate) async fn ticket(&self, owner_id: Uuid, ticket_id: Uuid) -> Result<Ticket> {
        let tree = self.tree.read().await;
        Ok(tree.node(owner_id, ticket_id)?.ticket.clone())
    }

    /// All tickets of one owner, most recent first.
    pub(crate) async fn tickets_of(&self, owner_id: Uuid) -> Vec<Ticket> {
        let tree = self.tree.read().await;
        let mut tickets: Vec<Ticket> = tree
            .tickets
            .get(&owner_id)
            .map(|nodes| nodes.values().map(|n| n.ticket.clone()).collect())
            .unwrap_or_default();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tickets
    }

    /// Run one atomic mutation against a ticket's fields. The closure sees
    /// the store's current value, so stale caller reads cannot commit; on
    /// success `updated_at` is refreshed and the change is published. An
    /// `Err` from the closure leaves the tree untouched. Returns the ticket
    /// as committed plus the closure's result.
    pub(crate) async fn update_ticket<R>(
        &self,
        owner_id: Uuid,
        ticket_id: Uuid,
        mutate: impl FnOnce(&mut Ticket) -> Result<R>,
    ) -> Result<(Ticket, R)> {
        let committed;
        {
            let mut tree = self.tree.write().await;
            let node = tree.node_mut(owner_id, ticket_id)?;
            let result = mutate(&mut node.ticket)?;
            node.ticket.updated_at = Utc::now();
            committed = (node.ticket.clone(), result);
        }
        self.emit(StoreEvent::TicketUpserted {
            owner_id,
            ticket_id,
        });
        Ok(committed)
    }

    /// Remove a ticket and its whole subtree (messages, typing flags,
    /// rating).
    pub(crate) async fn remove_ticket(&self, owner_id: Uuid, ticket_id: Uuid) -> Result<()> {
        {
            let mut tree = self.tree.write().await;
            let removed = tree
                .tickets
                .get_mut(&owner_id)
                .and_then(|nodes| nodes.remove(&ticket_id));
            if removed.is_none() {
                return Err(HelpdeskError::NotFound(format!(
                    "tickets/{owner_id}/{ticket_id}"
                )));
            }
        }
        debug!("removed tickets/{owner_id}/{ticket_id} subtree");
        self.emit(StoreEvent::TicketRemoved {
            owner_id,
            ticket_id,
        });
        Ok(())
    }

    // ---- messages ----

    /// Append a message to a ticket's transcript. The closed check runs
    /// against the store's current status at settlement, so a send that was
    /// initiated before a close event was observed still fails.
    pub(crate) async fn append_message(
        &self,
        owner_id: Uuid,
        ticket_id: Uuid,
        author: AuthorRole,
        text: String,
    ) -> Result<Message> {
        let message;
        {
            let mut tree = self.tree.write().await;
            let node = tree.node_mut(owner_id, ticket_id)?;
            if node.ticket.status == TicketStatus::Closed {
                return Err(HelpdeskError::ChatClosed);
            }
            message = Message {
                id: Uuid::new_v4(),
                ticket_id,
                owner_id,
                author,
                text,
                sent_at: Utc::now(),
            };
            node.messages.push(message.clone());
            node.ticket.updated_at = message.sent_at;
        }
        self.emit(StoreEvent::MessageAppended {
            owner_id,
            ticket_id,
        });
        Ok(message)
    }

    /// Transcript in arrival order.
    pub(crate) async fn messages_of(&self, owner_id: Uuid, ticket_id: Uuid) -> Result<Vec<Message>> {
        let tree = self.tree.read().await;
        Ok(tree.node(owner_id, ticket_id)?.messages.clone())
    }

    // ---- typing flags ----

    pub(crate) async fn set_typing(
        &self,
        owner_id: Uuid,
        ticket_id: Uuid,
        role: AuthorRole,
        is_typing: bool,
    ) -> Result<()> {
        {
            let mut tree = self.tree.write().await;
            let node = tree.node_mut(owner_id, ticket_id)?;
            node.typing.insert(role, is_typing);
        }
        self.emit(StoreEvent::TypingChanged {
            owner_id,
            ticket_id,
            role,
        });
        Ok(())
    }

    pub(crate) async fn typing(
        &self,
        owner_id: Uuid,
        ticket_id: Uuid,
        role: AuthorRole,
    ) -> Result<bool> {
        let tree = self.tree.read().await;
        Ok(tree
            .node(owner_id, ticket_id)?
            .typing
            .get(&role)
            .copied()
            .unwrap_or(false))
    }

    // ---- profiles ----

    pub async fn save_profile(&self, owner_id: Uuid, profile: UserProfile) {
        {
            let mut tree = self.tree.write().await;
            tree.profiles.insert(owner_id, profile);
        }
        self.emit(StoreEvent::ProfileSaved { owner_id });
    }

    pub async fn profile(&self, owner_id: Uuid) -> Option<UserProfile> {
        let tree = self.tree.read().await;
        tree.profiles.get(&owner_id).cloned()
    }

    /// Live view of one owner's profile fields.
    pub fn observe_profile(&self, owner_id: Uuid) -> Live<Option<UserProfile>> {
        self.live_view(
            move |event| matches!(event, StoreEvent::ProfileSaved { owner_id: o } if *o == owner_id),
            move |store: TicketStore| async move { Some(store.profile(owner_id).await) },
        )
    }

    // ---- snapshots ----

    /// JSON snapshot of one owner's subtree, shaped like the storage
    /// layout. `Null` when the owner has no tickets.
    pub async fn snapshot(&self, owner_id: Uuid) -> Value {
        let tree = self.tree.read().await;
        let Some(nodes) = tree.tickets.get(&owner_id) else {
            return Value::Null;
        };
        let mut out = Map::new();
        for (ticket_id, node) in nodes {
            let mut fields = match serde_json::to_value(&node.ticket) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            };
            if !node.messages.is_empty() {
                let mut messages = Map::new();
                for message in &node.messages {
                    if let Ok(value) = serde_json::to_value(message) {
                        messages.insert(message.id.to_string(), value);
                    }
                }
                fields.insert("messages".into(), Value::Object(messages));
            }
            if !node.typing.is_empty() {
                let typing: Map<String, Value> = node
                    .typing
                    .iter()
                    .map(|(role, flag)| (role.key().to_string(), Value::Bool(*flag)))
                    .collect();
                fields.insert("typingStatus".into(), Value::Object(typing));
            }
            out.insert(ticket_id.to_string(), Value::Object(fields));
        }
        Value::Object(out)
    }

    // ---- live view plumbing ----

    /// Spawn a replay-then-live view: subscribe to the bus, deliver the
    /// current value once, then recompute and deliver after every matching
    /// event. `recompute` returning `None` ends the view (its source path
    /// is gone). Bus lag triggers a plain recompute since every recompute
    /// reads the full tree.
    pub(crate) fn live_view<T, M, C, Fut>(&self, matches: M, recompute: C) -> Live<T>
    where
        T: Send + 'static,
        M: Fn(&StoreEvent) -> bool + Send + 'static,
        C: Fn(TicketStore) -> Fut + Send + 'static,
        Fut: Future<Output = Option<T>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.live_depth);
        let mut bus = self.events.subscribe();
        let store = self.clone();
        let task = tokio::spawn(async move {
            match recompute(store.clone()).await {
                Some(initial) => {
                    if tx.send(initial).await.is_err() {
                        return;
                    }
                }
                None => return,
            }
            loop {
                match bus.recv().await {
                    Ok(event) if matches(&event) => {}
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                match recompute(store.clone()).await {
                    Some(view) => {
                        if tx.send(view).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        });
        Live::new(rx, task)
    }
}
