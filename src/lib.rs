//! Support-ticket lifecycle and real-time synchronization engine.
//!
//! End users open tickets, track their lifecycle and talk to a support
//! agent channel in real time. Everything hangs off one push-subscribed
//! [`store::TicketStore`]:
//!
//! - [`tickets`] creates tickets, assigns protocol codes and enforces the
//!   status transition graph;
//! - [`chat`] keeps one ticket's transcript ordered and gates sends on the
//!   continuously observed status;
//! - [`presence`] publishes and observes short-lived typing flags;
//! - [`stats`] derives dashboard counts from a ticket snapshot;
//! - [`ratings`] records the one-time post-closure rating;
//! - [`session`] carries the signed-in identity into every component.
//!
//! Presentation concerns live elsewhere; this crate is consumed in-process
//! and speaks nothing but the store's own push subscriptions.

pub mod chat;
pub mod config;
pub mod presence;
pub mod ratings;
pub mod session;
pub mod shared;
pub mod stats;
pub mod store;
pub mod tickets;

#[cfg(test)]
pub mod tests;

pub use shared::error::{FieldError, FieldErrors, HelpdeskError, Result};
