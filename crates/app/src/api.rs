use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use querydesk_core::{Desk, DeskError, Session, SessionId, SessionStore, TicketDraft};
use querydesk_models::{Identity, Role, StatusFilter, TableCapabilities, Ticket, TicketView};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::version_string;

#[derive(Clone)]
pub struct AppState {
    pub desk: Arc<Desk>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(desk: Desk) -> Self {
        Self::with_sessions(desk, SessionStore::new())
    }

    pub fn with_sessions(desk: Desk, sessions: SessionStore) -> Self {
        Self {
            desk: Arc::new(desk),
            sessions,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/session", get(current_session))
        .route("/capabilities", get(capabilities))
        .route("/capabilities/refresh", post(refresh_capabilities))
        .route("/tickets", post(create_ticket))
        .route("/tickets/mine", get(my_tickets))
        .route("/tickets/mine/filters", delete(clear_my_filters))
        .route("/support/tickets", get(support_board))
        .route(
            "/support/tickets/{id}",
            get(select_ticket).patch(update_ticket),
        );

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// --- Session extraction ---

fn bearer_id(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .trim()
        .parse()
        .ok()
}

/// The caller's session, loaded from the `Authorization: Bearer <id>` header.
pub struct CurrentSession {
    pub id: SessionId,
    pub session: Session,
}

impl CurrentSession {
    /// Write the (possibly mutated) session back to the store.
    async fn save(self, state: &AppState) {
        state.sessions.put(&self.id, self.session).await;
    }
}

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let not_logged_in = || AppError::Desk(DeskError::Unauthorized("Please log in first.".to_string()));
        let id = bearer_id(&parts.headers).ok_or_else(not_logged_in)?;
        let session = state.sessions.get(&id).await.ok_or_else(not_logged_in)?;
        Ok(CurrentSession { id, session })
    }
}

fn views(tickets: &[Ticket]) -> Vec<TicketView> {
    tickets.iter().map(TicketView::from).collect()
}

// --- Handlers ---

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Client Query Analysis System",
        "version": version_string()
    }))
}

#[derive(Deserialize)]
struct LoginRequest {
    role: Role,
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    session_id: SessionId,
    identity: Identity,
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    // Reuse the caller's session so one user can hold both roles.
    let existing = match bearer_id(&headers) {
        Some(id) => state.sessions.get(&id).await.map(|s| (id, s)),
        None => None,
    };
    let (id, mut session) = match existing {
        Some((id, session)) => (Some(id), session),
        None => (None, Session::default()),
    };

    let identity = state
        .desk
        .authenticate(&mut session, body.role, &body.username, &body.password)?;

    let session_id = match id {
        Some(id) => {
            state.sessions.put(&id, session).await;
            id
        }
        None => state.sessions.insert(session).await,
    };
    Ok(Json(LoginResponse {
        session_id,
        identity,
    }))
}

#[derive(Deserialize)]
struct LogoutQuery {
    role: Option<Role>,
}

/// Sign out of one role, or drop the whole session when no role is given
/// or none is left signed in.
async fn logout(
    State(state): State<AppState>,
    Query(params): Query<LogoutQuery>,
    mut current: CurrentSession,
) -> Json<serde_json::Value> {
    if let Some(role) = params.role {
        state.desk.logout(&mut current.session, role);
    }
    if params.role.is_none() || current.session.is_signed_out() {
        state.sessions.remove(&current.id).await;
        info!("Session {} ended", current.id);
    } else {
        current.save(&state).await;
    }
    Json(json!({ "status": "ok" }))
}

async fn current_session(current: CurrentSession) -> Json<Session> {
    Json(current.session)
}

async fn capabilities(State(state): State<AppState>) -> Json<TableCapabilities> {
    Json(state.desk.capabilities())
}

async fn refresh_capabilities(State(state): State<AppState>) -> Json<TableCapabilities> {
    Json(state.desk.refresh_capabilities().await)
}

#[derive(Serialize)]
struct CreatedResponse {
    query_id: i64,
    open_tickets: Vec<TicketView>,
}

async fn create_ticket(
    State(state): State<AppState>,
    mut current: CurrentSession,
    Json(draft): Json<TicketDraft>,
) -> AppResult<Json<CreatedResponse>> {
    let result = state.desk.create_ticket(&mut current.session, draft).await;
    current.save(&state).await;
    let created = result?;
    Ok(Json(CreatedResponse {
        query_id: created.query_id,
        open_tickets: views(&created.open_tickets),
    }))
}

#[derive(Deserialize)]
struct CheckQuery {
    status: Option<String>,
    query_id: Option<String>,
}

async fn my_tickets(
    State(state): State<AppState>,
    Query(params): Query<CheckQuery>,
    mut current: CurrentSession,
) -> AppResult<Json<Vec<TicketView>>> {
    let status = StatusFilter::parse(params.status.as_deref());
    let complaint_id = params.query_id.unwrap_or_default();
    let result = state
        .desk
        .check_status(&mut current.session, status, &complaint_id)
        .await;
    current.save(&state).await;
    Ok(Json(views(&result?)))
}

async fn clear_my_filters(
    State(state): State<AppState>,
    mut current: CurrentSession,
) -> Json<serde_json::Value> {
    state.desk.clear_check_filters(&mut current.session);
    current.save(&state).await;
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct BoardQuery {
    status: Option<String>,
}

#[derive(Serialize)]
struct BoardResponse {
    status_options: Vec<String>,
    status_filter: String,
    selected_id: Option<i64>,
    tickets: Vec<TicketView>,
}

async fn support_board(
    State(state): State<AppState>,
    Query(params): Query<BoardQuery>,
    mut current: CurrentSession,
) -> AppResult<Json<BoardResponse>> {
    let status = params.status.as_deref().map(|s| StatusFilter::parse(Some(s)));
    let result = state.desk.support_board(&mut current.session, status).await;
    current.save(&state).await;
    let board = result?;
    Ok(Json(BoardResponse {
        status_options: board.status_options,
        status_filter: board.status_filter.label().to_string(),
        selected_id: board.selected_id,
        tickets: views(&board.tickets),
    }))
}

#[derive(Serialize)]
struct SelectedResponse {
    ticket: TicketView,
    status_menu: Vec<String>,
}

async fn select_ticket(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    mut current: CurrentSession,
) -> AppResult<Json<SelectedResponse>> {
    let result = state.desk.select_ticket(&mut current.session, id).await;
    current.save(&state).await;
    let selected = result?;
    Ok(Json(SelectedResponse {
        ticket: selected.ticket.view(),
        status_menu: selected.status_menu,
    }))
}

#[derive(Deserialize)]
struct UpdateTicketRequest {
    status: String,
    #[serde(default)]
    remarks: String,
}

async fn update_ticket(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    mut current: CurrentSession,
    Json(body): Json<UpdateTicketRequest>,
) -> AppResult<Json<TicketView>> {
    let result = state
        .desk
        .update_status(&mut current.session, id, &body.status, &body.remarks)
        .await;
    current.save(&state).await;
    Ok(Json(result?.view()))
}
