use std::collections::BTreeMap;
use std::str::FromStr;

use actix_web::{HttpRequest, HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use strum::IntoEnumIterator;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

use crate::api::response::{Paginated, created, success};
use crate::api::security_log::{SecurityRecord, record_event};
use crate::auth::auth::AuthUser;
use crate::auth::policy::Capability;
use crate::error::{AppError, AppResult};
use crate::model::security_log::SecurityEvent;
use crate::model::ticket::{NoteCategory, Ticket, TicketNote, TicketPriority, TicketStatus, TicketStatusHistory};
use crate::utils::db_utils::{BindValues, WhereBuilder, build_insert_sql, paginate};

const TICKET_COLUMNS: &str =
    "id, requester_id, title, description, category, priority, status, assigned_to, created_at, updated_at";
const TITLE_MAX: usize = 200;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTicket {
    #[schema(example = "Printer lantai 2 tidak bisa mencetak")]
    pub title: String,
    #[schema(example = "Kertas macet sejak pagi")]
    pub description: String,
    #[schema(example = "hardware")]
    pub category: Option<String>,
    pub priority: Option<TicketPriority>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TicketQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTicketStatus {
    pub status: TicketStatus,
    #[schema(example = "Roller printer diganti")]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignTicket {
    #[schema(example = 2001)]
    pub assignee_id: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateNote {
    pub category: NoteCategory,
    #[schema(example = "Sudah dicoba restart, masih sama")]
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct TicketNotes {
    pub notes: Vec<TicketNote>,
    pub grouped: BTreeMap<NoteCategory, Vec<TicketNote>>,
}

/// Groups notes by category, keeping every category present even when empty.
/// Notes keep their incoming order within a group.
pub fn group_notes(notes: &[TicketNote]) -> BTreeMap<NoteCategory, Vec<TicketNote>> {
    let mut grouped: BTreeMap<_, _> = NoteCategory::iter().map(|c| (c, Vec::new())).collect();
    for note in notes {
        // rows with a category this build does not know are filed as general
        let category = NoteCategory::from_str(&note.category).unwrap_or(NoteCategory::General);
        grouped.entry(category).or_default().push(note.clone());
    }
    grouped
}

/// Requester or IT staff.
pub fn can_read_ticket(auth: &AuthUser, ticket: &Ticket) -> bool {
    ticket.requester_id == auth.employee_id || auth.can(Capability::ReadAllTicketNotes)
}

/// IT may post anything; the requester only general remarks and feedback.
pub fn can_post_note(auth: &AuthUser, ticket: &Ticket, category: NoteCategory) -> bool {
    if auth.can(Capability::ManageTickets) {
        return true;
    }
    ticket.requester_id == auth.employee_id
        && matches!(category, NoteCategory::General | NoteCategory::Feedback)
}

/// Checks a transition and picks the category of the note that goes with it.
pub fn plan_transition(current: TicketStatus, next: TicketStatus) -> AppResult<NoteCategory> {
    if current == next {
        return Err(AppError::validation(format!("Ticket is already {current}")));
    }
    if !current.can_transition_to(next) {
        return Err(AppError::validation(format!(
            "Cannot move ticket from {current} to {next}"
        )));
    }
    Ok(if next == TicketStatus::Resolved {
        NoteCategory::Resolution
    } else {
        NoteCategory::StatusUpdate
    })
}

fn non_blank(value: &str, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(AppError::validation(format!("{field} must not be empty")))
    } else {
        Ok(trimmed.to_string())
    }
}

async fn fetch_ticket(conn: &mut MySqlConnection, ticket_id: u64, for_update: bool) -> AppResult<Ticket> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    sqlx::query_as::<_, Ticket>(&format!(
        "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?{lock}"
    ))
    .bind(ticket_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::not_found("Ticket not found"))
}

/// Loads a ticket the caller may read. Denials land in the security log.
async fn readable_ticket(
    req: &HttpRequest,
    pool: &MySqlPool,
    auth: &AuthUser,
    ticket_id: u64,
) -> AppResult<Ticket> {
    let mut conn = pool.acquire().await?;
    let ticket = fetch_ticket(&mut conn, ticket_id, false).await?;
    drop(conn);

    if can_read_ticket(auth, &ticket) {
        return Ok(ticket);
    }

    info!(ticket_id, "Ticket access denied");
    record_event(
        pool,
        SecurityRecord::from_request(req, SecurityEvent::AccessDenied, Some(auth.employee_id), &auth.username),
    )
    .await;
    Err(AppError::forbidden("You may not view this ticket"))
}

async fn insert_history(
    conn: &mut MySqlConnection,
    ticket_id: u64,
    old_status: Option<TicketStatus>,
    new_status: TicketStatus,
    actor: u64,
) -> AppResult<()> {
    let sql = build_insert_sql(
        "ticket_status_history",
        &["ticket_id", "old_status", "new_status", "changed_by"],
    );
    sqlx::query(&sql)
        .bind(ticket_id)
        .bind(old_status.map(|s| s.as_ref().to_string()))
        .bind(new_status.as_ref())
        .bind(actor)
        .execute(conn)
        .await?;
    Ok(())
}

async fn insert_note(
    conn: &mut MySqlConnection,
    ticket_id: u64,
    author: u64,
    category: NoteCategory,
    body: &str,
) -> AppResult<u64> {
    let sql = build_insert_sql("ticket_notes", &["ticket_id", "author_id", "category", "body"]);
    let result = sqlx::query(&sql)
        .bind(ticket_id)
        .bind(author)
        .bind(category.as_ref())
        .bind(body)
        .execute(conn)
        .await?;
    Ok(result.last_insert_id())
}

/// Open a ticket
#[utoipa::path(
    post,
    path = "/api/tickets",
    request_body = CreateTicket,
    responses(
        (status = 201, description = "Ticket created", body = Ticket),
        (status = 400, description = "Missing title or description"),
        (status = 401, description = "Unauthenticated")
    ),
    security(("session_cookie" = [])),
    tag = "Tickets"
)]
#[instrument(name = "ticket_create", skip_all, fields(employee_id = auth.employee_id))]
pub async fn create_ticket(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateTicket>,
) -> AppResult<HttpResponse> {
    let title = non_blank(&payload.title, "title")?;
    if title.chars().count() > TITLE_MAX {
        return Err(AppError::validation(format!("title is limited to {TITLE_MAX} characters")));
    }
    let description = non_blank(&payload.description, "description")?;
    let category = payload
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("general")
        .to_lowercase();
    let priority = payload.priority.unwrap_or(TicketPriority::Medium);

    let mut tx = pool.begin().await?;

    let sql = build_insert_sql(
        "tickets",
        &["requester_id", "title", "description", "category", "priority", "status"],
    );
    let ticket_id = sqlx::query(&sql)
        .bind(auth.employee_id)
        .bind(&title)
        .bind(&description)
        .bind(&category)
        .bind(priority.as_ref())
        .bind(TicketStatus::Open.as_ref())
        .execute(&mut *tx)
        .await?
        .last_insert_id();

    insert_history(&mut tx, ticket_id, None, TicketStatus::Open, auth.employee_id).await?;
    let ticket = fetch_ticket(&mut tx, ticket_id, false).await?;
    tx.commit().await?;

    info!(ticket_id, "Ticket created");
    Ok(created("Ticket created", ticket))
}

/// List tickets; IT sees all, others their own
#[utoipa::path(
    get,
    path = "/api/tickets",
    params(TicketQuery),
    responses(
        (status = 200, description = "Paginated tickets", body = Object),
        (status = 400, description = "Unknown status"),
        (status = 401, description = "Unauthenticated")
    ),
    security(("session_cookie" = [])),
    tag = "Tickets"
)]
#[instrument(name = "ticket_list", skip_all, fields(employee_id = auth.employee_id))]
pub async fn list_tickets(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<TicketQuery>,
) -> AppResult<HttpResponse> {
    let (page, per_page, offset) = paginate(query.page, query.per_page, 20);
    let status = query
        .status
        .as_deref()
        .map(TicketStatus::from_str)
        .transpose()
        .map_err(|_| AppError::validation("Unknown status"))?;

    let filter = WhereBuilder::new()
        .eq_opt(
            "requester_id",
            auth.scoped_employee(Capability::ManageTickets, None),
        )
        .eq_opt("status", status.map(|s| s.as_ref().to_string()));

    let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM tickets{}", filter.clause()))
        .bind_values(filter.values())
        .fetch_one(pool.get_ref())
        .await?;

    let items = sqlx::query_as::<_, Ticket>(&format!(
        "SELECT {TICKET_COLUMNS} FROM tickets{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        filter.clause()
    ))
    .bind_values(filter.values())
    .bind(per_page)
    .bind(offset)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(success(
        "Ticket list",
        Paginated {
            items,
            page,
            per_page,
            total,
        },
    ))
}

/// Get a ticket
#[utoipa::path(
    get,
    path = "/api/tickets/{ticket_id}",
    params(("ticket_id", Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "Ticket", body = Ticket),
        (status = 401, description = "Unauthenticated"),
        (status = 403, description = "Not the requester and not IT"),
        (status = 404, description = "Ticket not found")
    ),
    security(("session_cookie" = [])),
    tag = "Tickets"
)]
#[instrument(name = "ticket_get", skip_all, fields(employee_id = auth.employee_id))]
pub async fn get_ticket(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let ticket = readable_ticket(&req, pool.get_ref(), &auth, path.into_inner()).await?;
    Ok(success("Ticket", ticket))
}

/// Change ticket status (IT only)
#[utoipa::path(
    put,
    path = "/api/tickets/{ticket_id}/status",
    params(("ticket_id", Path, description = "Ticket ID")),
    request_body = UpdateTicketStatus,
    responses(
        (status = 200, description = "Status changed", body = Ticket),
        (status = 400, description = "Same status or transition not allowed"),
        (status = 401, description = "Unauthenticated"),
        (status = 403, description = "IT department only"),
        (status = 404, description = "Ticket not found"),
        (status = 409, description = "Ticket changed concurrently")
    ),
    security(("session_cookie" = [])),
    tag = "Tickets"
)]
#[instrument(name = "ticket_status", skip_all, fields(employee_id = auth.employee_id))]
pub async fn update_ticket_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateTicketStatus>,
) -> AppResult<HttpResponse> {
    auth.require(Capability::ManageTickets)?;
    let ticket_id = path.into_inner();
    let next = payload.status;
    let note = payload
        .note
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let mut tx = pool.begin().await?;

    let ticket = fetch_ticket(&mut tx, ticket_id, false).await?;
    let current = TicketStatus::from_str(&ticket.status)
        .map_err(|_| AppError::Internal(format!("ticket {ticket_id} has unknown status {}", ticket.status)))?;
    let note_category = plan_transition(current, next)?;

    let changed = sqlx::query(
        "UPDATE tickets SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ? AND status = ?",
    )
    .bind(next.as_ref())
    .bind(ticket_id)
    .bind(current.as_ref())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if changed == 0 {
        tx.rollback().await?;
        return Err(AppError::conflict("Ticket was updated by someone else, reload and retry"));
    }

    insert_history(&mut tx, ticket_id, Some(current), next, auth.employee_id).await?;
    if let Some(note) = note {
        insert_note(&mut tx, ticket_id, auth.employee_id, note_category, note).await?;
    }
    let ticket = fetch_ticket(&mut tx, ticket_id, false).await?;
    tx.commit().await?;

    info!(ticket_id, from = %current, to = %next, "Ticket status changed");
    Ok(success("Ticket status updated", ticket))
}

/// Assign a ticket to a staff member (IT only)
#[utoipa::path(
    put,
    path = "/api/tickets/{ticket_id}/assign",
    params(("ticket_id", Path, description = "Ticket ID")),
    request_body = AssignTicket,
    responses(
        (status = 200, description = "Ticket assigned", body = Ticket),
        (status = 400, description = "Assignee is not active IT staff"),
        (status = 401, description = "Unauthenticated"),
        (status = 403, description = "IT department only"),
        (status = 404, description = "Ticket not found")
    ),
    security(("session_cookie" = [])),
    tag = "Tickets"
)]
#[instrument(name = "ticket_assign", skip_all, fields(employee_id = auth.employee_id))]
pub async fn assign_ticket(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<AssignTicket>,
) -> AppResult<HttpResponse> {
    auth.require(Capability::ManageTickets)?;
    let ticket_id = path.into_inner();

    let mut tx = pool.begin().await?;
    fetch_ticket(&mut tx, ticket_id, true).await?;

    let assignee = sqlx::query_as::<_, (String, String)>(
        "SELECT full_name, department_code FROM employees WHERE id = ? AND status = 'active'",
    )
    .bind(payload.assignee_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((assignee_name, department)) = assignee else {
        return Err(AppError::validation("Assignee must be an active employee"));
    };
    if !crate::auth::policy::allows(&department, Capability::ManageTickets) {
        return Err(AppError::validation("Assignee must be IT staff"));
    }

    sqlx::query("UPDATE tickets SET assigned_to = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(payload.assignee_id)
        .bind(ticket_id)
        .execute(&mut *tx)
        .await?;

    insert_note(
        &mut tx,
        ticket_id,
        auth.employee_id,
        NoteCategory::Assignment,
        &format!("Assigned to {assignee_name}"),
    )
    .await?;
    let ticket = fetch_ticket(&mut tx, ticket_id, false).await?;
    tx.commit().await?;

    info!(ticket_id, assignee_id = payload.assignee_id, "Ticket assigned");
    Ok(success("Ticket assigned", ticket))
}

/// Ticket notes, flat and grouped by category
#[utoipa::path(
    get,
    path = "/api/tickets/{ticket_id}/notes",
    params(("ticket_id", Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "`notes` oldest first and `grouped` by every category", body = Object),
        (status = 401, description = "Unauthenticated"),
        (status = 403, description = "Not the requester and not IT"),
        (status = 404, description = "Ticket not found")
    ),
    security(("session_cookie" = [])),
    tag = "Tickets"
)]
#[instrument(name = "ticket_notes", skip_all, fields(employee_id = auth.employee_id))]
pub async fn list_ticket_notes(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let ticket = readable_ticket(&req, pool.get_ref(), &auth, path.into_inner()).await?;

    let notes = sqlx::query_as::<_, TicketNote>(
        "SELECT n.id, n.ticket_id, n.author_id, e.full_name AS author_name, n.category, n.body, n.created_at
         FROM ticket_notes n
         JOIN employees e ON e.id = n.author_id
         WHERE n.ticket_id = ?
         ORDER BY n.created_at, n.id",
    )
    .bind(ticket.id)
    .fetch_all(pool.get_ref())
    .await?;

    let grouped = group_notes(&notes);
    Ok(success("Ticket notes", TicketNotes { notes, grouped }))
}

/// Add a note to a ticket
#[utoipa::path(
    post,
    path = "/api/tickets/{ticket_id}/notes",
    params(("ticket_id", Path, description = "Ticket ID")),
    request_body = CreateNote,
    responses(
        (status = 201, description = "Note added"),
        (status = 400, description = "Empty body"),
        (status = 401, description = "Unauthenticated"),
        (status = 403, description = "Category not allowed for the caller"),
        (status = 404, description = "Ticket not found")
    ),
    security(("session_cookie" = [])),
    tag = "Tickets"
)]
#[instrument(name = "ticket_note_add", skip_all, fields(employee_id = auth.employee_id))]
pub async fn add_ticket_note(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<CreateNote>,
) -> AppResult<HttpResponse> {
    let ticket = readable_ticket(&req, pool.get_ref(), &auth, path.into_inner()).await?;
    if !can_post_note(&auth, &ticket, payload.category) {
        return Err(AppError::forbidden(format!(
            "You may not post {} notes on this ticket",
            payload.category
        )));
    }
    let body = non_blank(&payload.body, "body")?;

    let mut conn = pool.acquire().await?;
    let note_id = insert_note(&mut conn, ticket.id, auth.employee_id, payload.category, &body).await?;

    info!(ticket_id = ticket.id, note_id, category = %payload.category, "Ticket note added");
    Ok(created("Note added", serde_json::json!({ "id": note_id })))
}

/// Ticket status history, oldest first
#[utoipa::path(
    get,
    path = "/api/tickets/{ticket_id}/status-history",
    params(("ticket_id", Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "Status transitions", body = [TicketStatusHistory]),
        (status = 401, description = "Unauthenticated"),
        (status = 403, description = "Not the requester and not IT"),
        (status = 404, description = "Ticket not found")
    ),
    security(("session_cookie" = [])),
    tag = "Tickets"
)]
#[instrument(name = "ticket_history", skip_all, fields(employee_id = auth.employee_id))]
pub async fn ticket_status_history(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let ticket = readable_ticket(&req, pool.get_ref(), &auth, path.into_inner()).await?;

    let history = sqlx::query_as::<_, TicketStatusHistory>(
        "SELECT h.id, h.ticket_id, h.old_status, h.new_status, h.changed_by,
                e.full_name AS changed_by_name, h.created_at
         FROM ticket_status_history h
         JOIN employees e ON e.id = h.changed_by
         WHERE h.ticket_id = ?
         ORDER BY h.created_at, h.id",
    )
    .bind(ticket.id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(success("Ticket status history", history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn user(id: u64, department: &str) -> AuthUser {
        AuthUser {
            employee_id: id,
            username: format!("user{id}"),
            department: department.into(),
        }
    }

    fn ticket(requester_id: u64) -> Ticket {
        Ticket {
            id: 1,
            requester_id,
            title: "VPN putus".into(),
            description: "Tidak bisa konek sejak pagi".into(),
            category: "network".into(),
            priority: "high".into(),
            status: "open".into(),
            assigned_to: None,
            created_at: NaiveDateTime::default(),
            updated_at: NaiveDateTime::default(),
        }
    }

    fn note(id: u64, category: &str) -> TicketNote {
        TicketNote {
            id,
            ticket_id: 1,
            author_id: 2,
            author_name: "Andi".into(),
            category: category.into(),
            body: format!("note {id}"),
            created_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn grouping_lists_every_category() {
        let grouped = group_notes(&[note(1, "feedback"), note(2, "resolution"), note(3, "feedback")]);

        assert_eq!(grouped.len(), NoteCategory::iter().count());
        assert_eq!(
            grouped[&NoteCategory::Feedback].iter().map(|n| n.id).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(grouped[&NoteCategory::Resolution].len(), 1);
        assert!(grouped[&NoteCategory::Assignment].is_empty());
    }

    #[test]
    fn grouping_with_no_notes_yields_empty_groups() {
        let grouped = group_notes(&[]);
        assert!(grouped.values().all(Vec::is_empty));
        let json = serde_json::to_value(&grouped).unwrap();
        assert!(json["status_update"].as_array().unwrap().is_empty());
    }

    #[test]
    fn requester_and_it_can_read_others_cannot() {
        let t = ticket(10);
        assert!(can_read_ticket(&user(10, "KEU"), &t));
        assert!(can_read_ticket(&user(99, "IT"), &t));
        assert!(!can_read_ticket(&user(99, "HRD"), &t));
    }

    #[test]
    fn requester_may_only_post_general_or_feedback() {
        let t = ticket(10);
        let requester = user(10, "KEU");
        assert!(can_post_note(&requester, &t, NoteCategory::Feedback));
        assert!(can_post_note(&requester, &t, NoteCategory::General));
        assert!(!can_post_note(&requester, &t, NoteCategory::Resolution));
        assert!(can_post_note(&user(99, "IT"), &t, NoteCategory::Resolution));
        assert!(!can_post_note(&user(99, "HRD"), &t, NoteCategory::General));
    }

    #[test]
    fn transition_to_same_status_is_rejected() {
        let err = plan_transition(TicketStatus::Pending, TicketStatus::Pending).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn resolving_produces_a_resolution_note() {
        assert_eq!(
            plan_transition(TicketStatus::InProgress, TicketStatus::Resolved).unwrap(),
            NoteCategory::Resolution
        );
        assert_eq!(
            plan_transition(TicketStatus::Open, TicketStatus::InProgress).unwrap(),
            NoteCategory::StatusUpdate
        );
        assert!(plan_transition(TicketStatus::Closed, TicketStatus::Open).is_err());
    }
}
