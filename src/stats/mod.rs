//! Dashboard aggregation derived from a ticket snapshot.

use crate::shared::models::{Ticket, TicketStatus};
use chrono::{DateTime, Duration, Local, NaiveTime};
use serde::Serialize;

/// Summary counts and rates over one owner's ticket set. Derived state
/// only: recompute whenever the input listing changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TicketStats {
    pub total: usize,
    pub open: usize,
    pub in_progress: usize,
    pub resolved: usize,
    pub closed: usize,
    /// Tickets created on or after local midnight seven days before `now`.
    pub opened_last_week: usize,
    /// Resolved / total as an integer percentage, rounded half-up. Zero
    /// when there are no tickets.
    pub resolution_rate: u8,
}

impl TicketStats {
    /// Pure and deterministic for a given `(tickets, now)` pair; no I/O.
    pub fn compute(tickets: &[Ticket], now: DateTime<Local>) -> Self {
        let mut stats = TicketStats {
            total: tickets.len(),
            ..TicketStats::default()
        };

        let cutoff = (now.naive_local().date() - Duration::days(7)).and_time(NaiveTime::MIN);
        for ticket in tickets {
            match ticket.status {
                TicketStatus::Open => stats.open += 1,
                TicketStatus::InProgress => stats.in_progress += 1,
                TicketStatus::Resolved => stats.resolved += 1,
                TicketStatus::Closed => stats.closed += 1,
            }
            if ticket.created_at.with_timezone(&Local).naive_local() >= cutoff {
                stats.opened_last_week += 1;
            }
        }

        if stats.total > 0 {
            // Integer half-up rounding of resolved / total * 100.
            stats.resolution_rate =
                ((stats.resolved * 200 + stats.total) / (stats.total * 2)) as u8;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{TicketCategory, TicketPriority};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn ticket(status: TicketStatus, created_at: DateTime<Utc>) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            protocol: "CH-TI-0-0000".into(),
            owner_id: Uuid::nil(),
            requester_name: "Ana Souza".into(),
            requester_email: "ana@example.com".into(),
            category: TicketCategory::Ti,
            priority: TicketPriority::Media,
            description: "Sem acesso ao sistema".into(),
            status,
            created_at,
            updated_at: created_at,
            rating: None,
        }
    }

    #[test]
    fn empty_set_is_all_zero() {
        let stats = TicketStats::compute(&[], Local::now());
        assert_eq!(stats, TicketStats::default());
    }

    #[test]
    fn resolution_rate_rounds_half_up() {
        use TicketStatus::*;
        let now = Local::now();
        let mk = |statuses: &[TicketStatus]| {
            statuses
                .iter()
                .map(|s| ticket(*s, Utc::now()))
                .collect::<Vec<_>>()
        };

        let quarter = mk(&[Open, Open, Resolved, Closed]);
        assert_eq!(TicketStats::compute(&quarter, now).resolution_rate, 25);

        let two_fifths = mk(&[Open, Open, Resolved, Closed, Resolved]);
        assert_eq!(TicketStats::compute(&two_fifths, now).resolution_rate, 40);

        // 1/8 = 12.5% rounds up to 13.
        let eighth = mk(&[Resolved, Open, Open, Open, Open, Open, Open, Open]);
        assert_eq!(TicketStats::compute(&eighth, now).resolution_rate, 13);

        // 2/3 = 66.67% rounds to 67.
        let two_thirds = mk(&[Resolved, Resolved, Open]);
        assert_eq!(TicketStats::compute(&two_thirds, now).resolution_rate, 67);
    }

    #[test]
    fn counts_split_by_status() {
        use TicketStatus::*;
        let now = Local::now();
        let tickets: Vec<Ticket> = [Open, Open, InProgress, Resolved, Closed, Closed]
            .iter()
            .map(|s| ticket(*s, Utc::now()))
            .collect();
        let stats = TicketStats::compute(&tickets, now);
        assert_eq!(stats.total, 6);
        assert_eq!(stats.open, 2);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.closed, 2);
    }

    #[test]
    fn last_week_cutoff_is_local_midnight_inclusive() {
        let now = Local.with_ymd_and_hms(2026, 8, 6, 15, 30, 0).unwrap();

        // Exactly at the cutoff instant: local midnight seven days back.
        let at_cutoff = Local
            .with_ymd_and_hms(2026, 7, 30, 0, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        // One second earlier falls outside the window.
        let before_cutoff = Local
            .with_ymd_and_hms(2026, 7, 29, 23, 59, 59)
            .unwrap()
            .with_timezone(&Utc);
        let recent = now.with_timezone(&Utc);

        let tickets = [
            ticket(TicketStatus::Open, at_cutoff),
            ticket(TicketStatus::Open, before_cutoff),
            ticket(TicketStatus::Open, recent),
        ];
        let stats = TicketStats::compute(&tickets, now);
        assert_eq!(stats.opened_last_week, 2);
    }
}
