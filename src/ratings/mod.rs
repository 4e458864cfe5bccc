//! One-shot post-closure satisfaction ratings.

use crate::shared::error::{HelpdeskError, Result};
use crate::shared::models::{Rating, TicketStatus};
use crate::store::TicketStore;
use chrono::Utc;
use log::info;
use uuid::Uuid;

/// Records at most one rating per ticket, only after closure.
#[derive(Clone)]
pub struct RatingCapture {
    store: TicketStore,
}

impl RatingCapture {
    pub fn new(store: TicketStore) -> Self {
        Self { store }
    }

    /// Attach a rating to a closed, not-yet-rated ticket. The checks and
    /// the write happen in one atomic step, so concurrent submissions
    /// cannot both win; every later call fails with `AlreadyRated`.
    pub async fn submit_rating(
        &self,
        owner_id: Uuid,
        ticket_id: Uuid,
        score: u8,
        comment: Option<String>,
    ) -> Result<Rating> {
        if !(1..=5).contains(&score) {
            return Err(HelpdeskError::validation("score", "must be between 1 and 5"));
        }
        let comment = comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let (_, rating) = self
            .store
            .update_ticket(owner_id, ticket_id, |ticket| {
                if ticket.status != TicketStatus::Closed {
                    return Err(HelpdeskError::InvalidState(format!(
                        "rating requires a closed ticket, status is {}",
                        ticket.status
                    )));
                }
                if ticket.rating.is_some() {
                    return Err(HelpdeskError::AlreadyRated);
                }
                let rating = Rating {
                    score,
                    comment,
                    submitted_at: Utc::now(),
                };
                ticket.rating = Some(rating.clone());
                Ok(rating)
            })
            .await?;
        info!("ticket {ticket_id} rated {score}/5");
        Ok(rating)
    }

    pub async fn rating(&self, owner_id: Uuid, ticket_id: Uuid) -> Result<Option<Rating>> {
        Ok(self.store.ticket(owner_id, ticket_id).await?.rating)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{Ticket, TicketCategory, TicketPriority};
    use crate::tests::test_util;

    async fn seeded(status: TicketStatus) -> (RatingCapture, TicketStore, Uuid, Uuid) {
        let store = TicketStore::default();
        let owner_id = Uuid::new_v4();
        let now = Utc::now();
        let ticket = store
            .insert_ticket(Ticket {
                id: Uuid::new_v4(),
                protocol: "CH-FIN-0-0000".into(),
                owner_id,
                requester_name: "Ana Souza".into(),
                requester_email: "ana@example.com".into(),
                category: TicketCategory::Financeiro,
                priority: TicketPriority::Media,
                description: "Nota fiscal com valor errado".into(),
                status,
                created_at: now,
                updated_at: now,
                rating: None,
            })
            .await
            .unwrap();
        (
            RatingCapture::new(store.clone()),
            store,
            owner_id,
            ticket.id,
        )
    }

    #[tokio::test]
    async fn rating_requires_a_closed_ticket() {
        test_util::setup();
        for status in [
            TicketStatus::Open,
            TicketStatus::InProgress,
            TicketStatus::Resolved,
        ] {
            let (ratings, _, owner, ticket) = seeded(status).await;
            assert!(matches!(
                ratings.submit_rating(owner, ticket, 5, None).await,
                Err(HelpdeskError::InvalidState(_))
            ));
        }
    }

    #[tokio::test]
    async fn rating_succeeds_exactly_once() {
        let (ratings, store, owner, ticket) = seeded(TicketStatus::Closed).await;
        let rating = ratings
            .submit_rating(owner, ticket, 5, Some("Rápido".into()))
            .await
            .unwrap();
        assert_eq!(rating.score, 5);
        assert_eq!(rating.comment.as_deref(), Some("Rápido"));

        // Visible to every observer of the ticket record.
        assert_eq!(
            store.ticket(owner, ticket).await.unwrap().rating,
            Some(rating.clone())
        );
        assert_eq!(ratings.rating(owner, ticket).await.unwrap(), Some(rating));

        // Any repeat call fails, whatever the arguments.
        for score in [1, 5] {
            assert!(matches!(
                ratings.submit_rating(owner, ticket, score, None).await,
                Err(HelpdeskError::AlreadyRated)
            ));
        }
    }

    #[tokio::test]
    async fn score_outside_one_to_five_is_rejected() {
        let (ratings, store, owner, ticket) = seeded(TicketStatus::Closed).await;
        for score in [0, 6, 200] {
            assert!(matches!(
                ratings.submit_rating(owner, ticket, score, None).await,
                Err(HelpdeskError::Validation(_))
            ));
        }
        assert_eq!(store.ticket(owner, ticket).await.unwrap().rating, None);
    }

    #[tokio::test]
    async fn blank_comment_is_stored_as_none() {
        let (ratings, _, owner, ticket) = seeded(TicketStatus::Closed).await;
        let rating = ratings
            .submit_rating(owner, ticket, 4, Some("   ".into()))
            .await
            .unwrap();
        assert_eq!(rating.comment, None);
    }

    #[tokio::test]
    async fn concurrent_submissions_have_a_single_winner() {
        let (ratings, _, owner, ticket) = seeded(TicketStatus::Closed).await;
        let (a, b) = tokio::join!(
            ratings.submit_rating(owner, ticket, 5, None),
            ratings.submit_rating(owner, ticket, 1, None),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let stored = ratings.rating(owner, ticket).await.unwrap().unwrap();
        assert!(stored.score == 5 || stored.score == 1);
    }
}
