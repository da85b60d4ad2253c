use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumIter, EnumString, Serialize, Deserialize, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Pending,
    Resolved,
    Closed,
}

impl TicketStatus {
    /// Statuses reachable from `self`. `Closed` is terminal.
    pub fn next_allowed(self) -> &'static [TicketStatus] {
        use TicketStatus::*;
        match self {
            Open => &[InProgress, Pending, Resolved, Closed],
            InProgress => &[Pending, Resolved, Closed],
            Pending => &[InProgress, Resolved, Closed],
            Resolved => &[InProgress, Closed],
            Closed => &[],
        }
    }

    pub fn can_transition_to(self, to: TicketStatus) -> bool {
        self.next_allowed().contains(&to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, AsRefStr, Display, EnumIter, EnumString,
    Serialize, Deserialize, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NoteCategory {
    General,
    StatusUpdate,
    Feedback,
    Assignment,
    Resolution,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Ticket {
    pub id: u64,
    pub requester_id: u64,
    #[schema(example = "Printer lantai 2 tidak bisa mencetak")]
    pub title: String,
    pub description: String,
    #[schema(example = "hardware")]
    pub category: String,
    #[schema(example = "medium")]
    pub priority: String,
    #[schema(example = "open")]
    pub status: String,
    pub assigned_to: Option<u64>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct TicketStatusHistory {
    pub id: u64,
    pub ticket_id: u64,
    /// `None` for the creation row.
    #[schema(example = "open", nullable = true)]
    pub old_status: Option<String>,
    #[schema(example = "in_progress")]
    pub new_status: String,
    pub changed_by: u64,
    #[schema(example = "Andi Pratama")]
    pub changed_by_name: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct TicketNote {
    pub id: u64,
    pub ticket_id: u64,
    pub author_id: u64,
    #[schema(example = "Andi Pratama")]
    pub author_name: String,
    #[schema(example = "status_update")]
    pub category: String,
    #[schema(example = "Toner sudah diganti")]
    pub body: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn closed_is_terminal() {
        assert!(TicketStatus::Closed.next_allowed().is_empty());
        assert!(!TicketStatus::Closed.can_transition_to(TicketStatus::Open));
    }

    #[test]
    fn resolved_can_be_reopened_into_progress() {
        assert!(TicketStatus::Resolved.can_transition_to(TicketStatus::InProgress));
        assert!(!TicketStatus::Resolved.can_transition_to(TicketStatus::Open));
    }

    #[test]
    fn no_status_transitions_to_itself() {
        use strum::IntoEnumIterator;
        for status in TicketStatus::iter() {
            assert!(!status.can_transition_to(status), "{status}");
        }
    }

    #[test]
    fn categories_round_trip_through_snake_case() {
        assert_eq!(NoteCategory::StatusUpdate.as_ref(), "status_update");
        assert_eq!(
            NoteCategory::from_str("resolution").ok(),
            Some(NoteCategory::Resolution)
        );
        assert!(NoteCategory::from_str("gossip").is_err());
    }
}
