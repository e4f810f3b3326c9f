use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use querydesk_models::{
    Identity, NewTicket, Role, STATUS_MENU, StatusFilter, TableCapabilities, Ticket, TicketFilter,
};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::auth::CredentialProvider;
use crate::error::{DeskError, DeskResult};
use crate::session::{Session, TicketDraft};

/// Result of a client submission: the new id plus the submitter's open tickets.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedTicket {
    pub query_id: i64,
    pub open_tickets: Vec<Ticket>,
}

/// What support sees: every ticket narrowed by the active status filter.
#[derive(Debug, Clone, Serialize)]
pub struct SupportBoard {
    pub status_options: Vec<String>,
    pub status_filter: StatusFilter,
    pub selected_id: Option<i64>,
    pub tickets: Vec<Ticket>,
}

/// One ticket picked by support, with the statuses it may be moved to.
#[derive(Debug, Clone, Serialize)]
pub struct SelectedTicket {
    pub ticket: Ticket,
    pub status_menu: Vec<String>,
}

/// The ticketing service: credentials, capabilities and the ticket table.
pub struct Desk {
    pool: SqlitePool,
    credentials: Arc<dyn CredentialProvider>,
    capabilities: RwLock<TableCapabilities>,
}

impl Desk {
    /// Detects table capabilities once; see [`Desk::refresh_capabilities`].
    pub async fn new(pool: SqlitePool, credentials: Arc<dyn CredentialProvider>) -> Self {
        let capabilities = querydesk_db::detect_capabilities(&pool).await;
        info!(
            auto_increment = capabilities.has_auto_increment_id,
            remarks = capabilities.has_remarks_column,
            "Ticket table capabilities"
        );
        Self {
            pool,
            credentials,
            capabilities: RwLock::new(capabilities),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn capabilities(&self) -> TableCapabilities {
        *self
            .capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-probe the schema, e.g. after the table was altered underneath us.
    pub async fn refresh_capabilities(&self) -> TableCapabilities {
        let fresh = querydesk_db::detect_capabilities(&self.pool).await;
        *self
            .capabilities
            .write()
            .unwrap_or_else(PoisonError::into_inner) = fresh;
        info!(?fresh, "Ticket table capabilities refreshed");
        fresh
    }

    /// Run `op` with the cached capabilities. If it fails while the cache
    /// claims a remarks column, re-probe and retry once without it.
    async fn with_capabilities<T, F, Fut>(&self, op: F) -> anyhow::Result<T>
    where
        F: Fn(TableCapabilities) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let caps = self.capabilities();
        match op(caps).await {
            Err(e) if caps.has_remarks_column => {
                let fresh = self.refresh_capabilities().await;
                if fresh.has_remarks_column {
                    return Err(e);
                }
                warn!("Query failed with remarks column, retrying without it: {e}");
                op(fresh).await
            }
            result => result,
        }
    }

    // --- Auth ---

    pub fn authenticate(
        &self,
        session: &mut Session,
        role: Role,
        username: &str,
        password: &str,
    ) -> DeskResult<Identity> {
        match self.credentials.verify(role, username, password) {
            Some(identity) => {
                session.sign_in(&identity);
                info!("{role} '{username}' logged in");
                Ok(identity)
            }
            None => {
                warn!("Failed {role} login for '{username}'");
                Err(DeskError::Unauthorized(
                    "Invalid username or password.".to_string(),
                ))
            }
        }
    }

    pub fn logout(&self, session: &mut Session, role: Role) {
        session.sign_out(role);
    }

    // --- Plain operations ---

    /// Validate and insert a ticket. Returns the assigned id.
    pub async fn submit(&self, draft: &TicketDraft) -> DeskResult<i64> {
        let ticket = validate_draft(draft)?;
        querydesk_db::create_ticket(&self.pool, &self.capabilities(), &ticket)
            .await
            .map_err(DeskError::storage("Failed to submit complaint"))
    }

    pub async fn find_tickets(&self, filter: &TicketFilter) -> DeskResult<Vec<Ticket>> {
        self.with_capabilities(|caps| async move {
            querydesk_db::find_tickets(&self.pool, &caps, filter).await
        })
        .await
        .map_err(DeskError::storage("Lookup failed"))
    }

    pub async fn find_open_by_contact(&self, email: &str, mobile: &str) -> DeskResult<Vec<Ticket>> {
        self.with_capabilities(|caps| async move {
            querydesk_db::find_open_by_contact(&self.pool, &caps, email, mobile).await
        })
        .await
        .map_err(DeskError::storage("Lookup failed"))
    }

    pub async fn list_all(&self) -> DeskResult<Vec<Ticket>> {
        self.with_capabilities(|caps| async move { querydesk_db::list_all(&self.pool, &caps).await })
            .await
            .map_err(DeskError::storage("Database fetch error"))
    }

    pub async fn get_ticket(&self, query_id: i64) -> DeskResult<Ticket> {
        self.with_capabilities(|caps| async move {
            querydesk_db::get_ticket(&self.pool, &caps, query_id).await
        })
        .await
        .map_err(DeskError::storage("Database fetch error"))?
        .ok_or(DeskError::NotFound(query_id))
    }

    /// Set status and remarks and return the updated ticket.
    pub async fn set_status(&self, query_id: i64, status: &str, remarks: &str) -> DeskResult<Ticket> {
        let status = status.trim();
        if status.is_empty() {
            return Err(DeskError::validation("Please choose a status."));
        }
        let updated = self
            .with_capabilities(|caps| async move {
                querydesk_db::update_status(&self.pool, &caps, query_id, status, remarks).await
            })
            .await
            .map_err(DeskError::storage("Update failed"))?;
        if !updated {
            return Err(DeskError::NotFound(query_id));
        }
        self.get_ticket(query_id).await
    }

    // --- Client panel ---

    /// Raise a query from the client form. The draft stays in the session
    /// unless the insert succeeds.
    pub async fn create_ticket(
        &self,
        session: &mut Session,
        draft: TicketDraft,
    ) -> DeskResult<CreatedTicket> {
        require(session, Role::Client)?;
        session.client.draft = draft;
        let query_id = self.submit(&session.client.draft).await?;
        let draft = std::mem::take(&mut session.client.draft);

        // The row is committed; a failed follow-up lookup must not undo that.
        let open_tickets = match self
            .find_open_by_contact(draft.email.trim(), draft.mobile.trim())
            .await
        {
            Ok(tickets) => tickets,
            Err(e) => {
                warn!("Ticket {query_id} created but open tickets lookup failed: {e}");
                Vec::new()
            }
        };
        if !open_tickets.iter().any(|t| t.query_id == query_id) {
            warn!("Ticket {query_id} missing from open tickets right after insert");
        }
        Ok(CreatedTicket {
            query_id,
            open_tickets,
        })
    }

    /// The client's own tickets, optionally narrowed to one complaint id.
    pub async fn check_status(
        &self,
        session: &mut Session,
        status: StatusFilter,
        complaint_id: &str,
    ) -> DeskResult<Vec<Ticket>> {
        require(session, Role::Client)?;
        session.client.check.status = status.clone();
        session.client.check.complaint_id = complaint_id.to_string();

        let wanted_id = parse_complaint_id(complaint_id)?;
        let filter = TicketFilter {
            name: None,
            email: non_empty(&session.client.email),
            mobile: non_empty(&session.client.mobile),
            status,
        };
        let mut tickets = self.find_tickets(&filter).await?;
        if let Some(id) = wanted_id {
            tickets.retain(|t| t.query_id == id);
        }
        Ok(tickets)
    }

    pub fn clear_check_filters(&self, session: &mut Session) {
        session.client.check = Default::default();
    }

    // --- Support panel ---

    /// Every ticket, filtered in memory by a status found in the data.
    /// `status = None` reuses the filter remembered in the session.
    pub async fn support_board(
        &self,
        session: &mut Session,
        status: Option<StatusFilter>,
    ) -> DeskResult<SupportBoard> {
        require(session, Role::Support)?;
        let all = self.list_all().await?;

        let status_options: Vec<String> = all
            .iter()
            .map(|t| t.status.as_str())
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut status_filter = status.unwrap_or_else(|| session.support.status_filter.clone());
        if matches!(&status_filter, StatusFilter::Only(s) if !status_options.contains(s)) {
            status_filter = StatusFilter::All;
        }
        session.support.status_filter = status_filter.clone();

        let tickets: Vec<Ticket> = all
            .into_iter()
            .filter(|t| status_filter.matches(&t.status))
            .collect();

        // Keep the selection only while it is visible.
        let selected = session.support.selected_id;
        if !tickets.iter().any(|t| Some(t.query_id) == selected) {
            session.support.selected_id = tickets.first().map(|t| t.query_id);
        }

        Ok(SupportBoard {
            status_options,
            status_filter,
            selected_id: session.support.selected_id,
            tickets,
        })
    }

    pub async fn select_ticket(
        &self,
        session: &mut Session,
        query_id: i64,
    ) -> DeskResult<SelectedTicket> {
        require(session, Role::Support)?;
        let ticket = self.get_ticket(query_id).await?;
        session.support.selected_id = Some(query_id);
        let status_menu = status_menu(&ticket.status);
        Ok(SelectedTicket {
            ticket,
            status_menu,
        })
    }

    pub async fn update_status(
        &self,
        session: &mut Session,
        query_id: i64,
        status: &str,
        remarks: &str,
    ) -> DeskResult<Ticket> {
        require(session, Role::Support)?;
        let ticket = self.set_status(query_id, status, remarks).await?;
        session.support.selected_id = Some(query_id);
        info!("{} updated ticket {query_id}", session.support.username);
        Ok(ticket)
    }
}

fn require(session: &Session, role: Role) -> DeskResult<()> {
    if session.is_authenticated(role) {
        Ok(())
    } else {
        Err(DeskError::Unauthorized(format!("Please log in as {role} first.")))
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Collect every problem with the draft, then build the row to insert.
pub fn validate_draft(draft: &TicketDraft) -> DeskResult<NewTicket> {
    let fields = [
        ("Name", &draft.name),
        ("Email", &draft.email),
        ("Mobile", &draft.mobile),
        ("Query Heading", &draft.query_heading),
        ("Query Description", &draft.query_description),
    ];
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(label, _)| *label)
        .collect();

    let mut violations = Vec::new();
    if !missing.is_empty() {
        violations.push(format!("Please fill required fields: {}", missing.join(", ")));
    }
    if !draft.confirmed {
        violations.push("Please tick the confirmation checkbox.".to_string());
    }
    if !violations.is_empty() {
        return Err(DeskError::Validation(violations));
    }

    Ok(NewTicket {
        name: draft.name.trim().to_string(),
        email: draft.email.trim().to_string(),
        mobile: draft.mobile.trim().to_string(),
        query_heading: draft.query_heading.trim().to_string(),
        query_description: draft.query_description.trim().to_string(),
    })
}

/// Blank means "any id"; anything else must be a number.
pub fn parse_complaint_id(raw: &str) -> DeskResult<Option<i64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse().map(Some).map_err(|_| {
        DeskError::validation("Complaint ID must be a number. Please enter a valid numeric ID.")
    })
}

/// Fixed menu, with a custom current status offered first.
pub fn status_menu(current: &str) -> Vec<String> {
    let mut menu: Vec<String> = STATUS_MENU.iter().map(|s| s.to_string()).collect();
    if !current.is_empty() && !STATUS_MENU.contains(&current) {
        menu.insert(0, current.to_string());
    }
    menu
}
