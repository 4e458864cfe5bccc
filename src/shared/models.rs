use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle states of a ticket. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    /// The allowed transition edges:
    /// Open -> InProgress, InProgress -> {Open, Resolved, Closed},
    /// Resolved -> Closed. Nothing leaves Closed.
    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (Open, InProgress)
                | (InProgress, Open)
                | (InProgress, Resolved)
                | (InProgress, Closed)
                | (Resolved, Closed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Open => "Open",
            TicketStatus::InProgress => "InProgress",
            TicketStatus::Resolved => "Resolved",
            TicketStatus::Closed => "Closed",
        }
    }

    pub const ALL: [TicketStatus; 4] = [
        TicketStatus::Open,
        TicketStatus::InProgress,
        TicketStatus::Resolved,
        TicketStatus::Closed,
    ];
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Open" => Ok(TicketStatus::Open),
            "InProgress" => Ok(TicketStatus::InProgress),
            "Resolved" => Ok(TicketStatus::Resolved),
            "Closed" => Ok(TicketStatus::Closed),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Ticket categories. The serialized labels are the ones the intake form
/// has always used; `code` is the short form embedded in protocol codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketCategory {
    #[serde(rename = "TI")]
    Ti,
    Financeiro,
    #[serde(rename = "RH")]
    Rh,
}

impl TicketCategory {
    pub fn code(self) -> &'static str {
        match self {
            TicketCategory::Ti => "TI",
            TicketCategory::Financeiro => "FIN",
            TicketCategory::Rh => "RH",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TicketCategory::Ti => "TI",
            TicketCategory::Financeiro => "Financeiro",
            TicketCategory::Rh => "RH",
        }
    }
}

impl fmt::Display for TicketCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "TI" => Ok(TicketCategory::Ti),
            "Financeiro" => Ok(TicketCategory::Financeiro),
            "RH" => Ok(TicketCategory::Rh),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// Ticket priorities, ordered from lowest to highest urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TicketPriority {
    Baixa,
    #[serde(rename = "Média")]
    Media,
    Alta,
    #[serde(rename = "Crítica")]
    Critica,
}

impl TicketPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketPriority::Baixa => "Baixa",
            TicketPriority::Media => "Média",
            TicketPriority::Alta => "Alta",
            TicketPriority::Critica => "Crítica",
        }
    }
}

impl fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Baixa" => Ok(TicketPriority::Baixa),
            "Média" | "Media" => Ok(TicketPriority::Media),
            "Alta" => Ok(TicketPriority::Alta),
            "Crítica" | "Critica" => Ok(TicketPriority::Critica),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Which side of the conversation an actor is on. The serialized keys
/// ("usuario" / "admin") double as the typing-flag path segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorRole {
    #[serde(rename = "usuario")]
    Requester,
    #[serde(rename = "admin")]
    Agent,
}

impl AuthorRole {
    pub fn key(self) -> &'static str {
        match self {
            AuthorRole::Requester => "usuario",
            AuthorRole::Agent => "admin",
        }
    }
}

impl fmt::Display for AuthorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A support ticket. Everything except `status`, `updated_at` and the
/// one-shot `rating` is immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub protocol: String,
    pub owner_id: Uuid,
    pub requester_name: String,
    pub requester_email: String,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub description: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
}

/// A single chat message. `sent_at` is the sole sort key of a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub owner_id: Uuid,
    pub author: AuthorRole,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// One-time post-closure satisfaction feedback. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Profile fields kept alongside a user's tickets and shown on the
/// dashboard header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub role: String,
    pub email: String,
}
