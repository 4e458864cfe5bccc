//! Ticket lifecycle: intake validation, protocol codes, the status
//! transition graph and live listings.

use crate::session::SessionContext;
use crate::shared::error::{FieldErrors, HelpdeskError, Result};
use crate::shared::models::{Ticket, TicketCategory, TicketPriority, TicketStatus};
use crate::store::{Live, StoreEvent, TicketStore};
use chrono::{DateTime, Utc};
use log::info;
use std::str::FromStr;
use uuid::Uuid;

/// Leading segment of every protocol code.
pub const PROTOCOL_PREFIX: &str = "CH";

/// Intake form input, as typed. Validation reports every failing field at
/// once, not just the first.
#[derive(Debug, Clone, Default)]
pub struct NewTicket {
    pub requester_name: String,
    pub requester_email: String,
    pub category: String,
    pub priority: String,
    pub description: String,
}

/// Optional filters over a ticket listing.
#[derive(Debug, Clone, Default)]
pub struct TicketQuery {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub category: Option<TicketCategory>,
    pub search: Option<String>,
}

impl TicketQuery {
    pub fn matches(&self, ticket: &Ticket) -> bool {
        if let Some(status) = self.status {
            if ticket.status != status {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if ticket.priority != priority {
                return false;
            }
        }
        if let Some(category) = self.category {
            if ticket.category != category {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.trim().to_lowercase();
            if !needle.is_empty()
                && !ticket.description.to_lowercase().contains(&needle)
                && !ticket.protocol.to_lowercase().contains(&needle)
                && !ticket.requester_name.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

/// Creates tickets and enforces the status transition graph.
#[derive(Clone)]
pub struct TicketManager {
    store: TicketStore,
    session: SessionContext,
}

impl TicketManager {
    pub fn new(store: TicketStore, session: SessionContext) -> Self {
        Self { store, session }
    }

    /// Open a new ticket for the signed-in user. Fails with
    /// `Unauthenticated` when the session has no user, or with a
    /// `Validation` error carrying every failing field.
    pub async fn create_ticket(&self, new: NewTicket) -> Result<Ticket> {
        let user = self.session.require_user()?;

        let mut errors = FieldErrors::new();
        let name = new.requester_name.trim();
        if name.chars().count() < 2 {
            errors.push("requesterName", "must be at least 2 characters");
        }
        let email = new.requester_email.trim();
        if !email_is_well_formed(email) {
            errors.push("requesterEmail", "must be a valid email address");
        }
        check_choice::<TicketCategory>(&new.category, "category", &mut errors);
        check_choice::<TicketPriority>(&new.priority, "priority", &mut errors);
        let description = new.description.trim();
        if description.chars().count() < 10 {
            errors.push("description", "must be at least 10 characters");
        }
        errors.into_result()?;

        let category: TicketCategory = parse_checked(&new.category, "category")?;
        let priority: TicketPriority = parse_checked(&new.priority, "priority")?;

        let now = Utc::now();
        let ticket = self
            .store
            .insert_ticket(Ticket {
                id: Uuid::new_v4(),
                protocol: generate_protocol(category, now),
                owner_id: user.id,
                requester_name: name.to_string(),
                requester_email: email.to_string(),
                category,
                priority,
                description: description.to_string(),
                status: TicketStatus::Open,
                created_at: now,
                updated_at: now,
                rating: None,
            })
            .await?;
        info!("ticket {} opened as {}", ticket.id, ticket.protocol);
        Ok(ticket)
    }

    /// Move a ticket along the transition graph. The edge is validated
    /// against the store's current status inside the write, so a caller
    /// holding a stale read cannot commit an invalid transition.
    pub async fn transition_status(
        &self,
        owner_id: Uuid,
        ticket_id: Uuid,
        new_status: TicketStatus,
    ) -> Result<Ticket> {
        let (ticket, ()) = self
            .store
            .update_ticket(owner_id, ticket_id, |ticket| {
                if !ticket.status.can_transition_to(new_status) {
                    return Err(HelpdeskError::InvalidTransition {
                        from: ticket.status,
                        to: new_status,
                    });
                }
                ticket.status = new_status;
                Ok(())
            })
            .await?;
        info!("ticket {} moved to {}", ticket_id, new_status);
        Ok(ticket)
    }

    pub async fn get_ticket(&self, owner_id: Uuid, ticket_id: Uuid) -> Result<Ticket> {
        self.store.ticket(owner_id, ticket_id).await
    }

    /// Live listing of one owner's tickets, most recent first. Replays the
    /// current set on subscription, then follows every change until
    /// cancelled.
    pub fn list_tickets(&self, owner_id: Uuid) -> Live<Vec<Ticket>> {
        self.list_tickets_filtered(owner_id, TicketQuery::default())
    }

    /// Same as [`list_tickets`](Self::list_tickets), restricted to tickets
    /// matching `query`.
    pub fn list_tickets_filtered(&self, owner_id: Uuid, query: TicketQuery) -> Live<Vec<Ticket>> {
        self.store.live_view(
            move |event| {
                matches!(
                    event,
                    StoreEvent::TicketUpserted { .. } | StoreEvent::TicketRemoved { .. }
                ) && event.owner_id() == owner_id
            },
            move |store: TicketStore| {
                let query = query.clone();
                async move {
                    let mut tickets = store.tickets_of(owner_id).await;
                    tickets.retain(|ticket| query.matches(ticket));
                    Some(tickets)
                }
            },
        )
    }

    /// Delete a ticket and everything under it: messages, typing flags and
    /// rating go with the record.
    pub async fn delete_ticket(&self, owner_id: Uuid, ticket_id: Uuid) -> Result<()> {
        self.store.remove_ticket(owner_id, ticket_id).await?;
        info!("ticket {ticket_id} deleted");
        Ok(())
    }
}

/// `CH-<category code>-<unix millis>-<4 hex>`. Uniqueness is practical,
/// not guaranteed: same-millisecond creations differ in the random suffix.
fn generate_protocol(category: TicketCategory, now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::random();
    format!(
        "{PROTOCOL_PREFIX}-{}-{}-{:04X}",
        category.code(),
        now.timestamp_millis(),
        suffix
    )
}

fn email_is_well_formed(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !email.contains(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

fn check_choice<T: FromStr<Err = String>>(raw: &str, field: &str, errors: &mut FieldErrors) {
    let raw = raw.trim();
    if raw.is_empty() {
        errors.push(field, "is required");
    } else if let Err(message) = raw.parse::<T>() {
        errors.push(field, message);
    }
}

fn parse_checked<T: FromStr<Err = String>>(raw: &str, field: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|message: String| HelpdeskError::validation(field, message))
}
