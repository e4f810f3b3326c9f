use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use querydesk_models::{
    NewTicket, STATUS_OPEN, StatusFilter, TableCapabilities, Ticket, TicketFilter,
    is_closed_status,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, info, warn};

pub const TABLE: &str = "customer_data";

pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    // Every connection to `:memory:` is its own database.
    let pool = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new().connect_with(options).await?
    };
    info!("Connected to database: {database_url}");
    Ok(pool)
}

/// Single-connection in-memory pool, empty schema.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    connect("sqlite::memory:").await
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("Migrations applied");
    Ok(())
}

// --- Capability detection ---

/// One entry of `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub decl_type: String,
    pub pk: i64,
}

pub async fn describe_columns(pool: &SqlitePool) -> Result<Vec<ColumnInfo>> {
    let rows = sqlx::query(&format!("PRAGMA table_info({TABLE})"))
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|row| -> Result<ColumnInfo> {
            Ok(ColumnInfo {
                name: row.try_get("name")?,
                decl_type: row.try_get("type")?,
                pk: row.try_get("pk")?,
            })
        })
        .collect()
}

/// Probe the table schema. Any failure degrades to "no capabilities".
pub async fn detect_capabilities(pool: &SqlitePool) -> TableCapabilities {
    match probe_capabilities(pool).await {
        Ok(caps) => {
            debug!(?caps, "Table capabilities detected");
            caps
        }
        Err(e) => {
            warn!("Capability detection failed, assuming none: {e}");
            TableCapabilities::default()
        }
    }
}

async fn probe_capabilities(pool: &SqlitePool) -> Result<TableCapabilities> {
    let columns = describe_columns(pool).await?;
    let table_sql = sqlx::query_scalar::<_, Option<String>>(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
    )
    .bind(TABLE)
    .fetch_optional(pool)
    .await?
    .flatten();
    let without_rowid = table_sql
        .map(|sql| sql.to_ascii_uppercase().contains("WITHOUT ROWID"))
        .unwrap_or(false);

    // Only a lone `INTEGER PRIMARY KEY` aliases the rowid and gets engine-assigned values.
    let pk_columns: Vec<&ColumnInfo> = columns.iter().filter(|c| c.pk > 0).collect();
    let has_auto_increment_id = !without_rowid
        && matches!(pk_columns.as_slice(), [col]
            if col.name.eq_ignore_ascii_case("query_id")
                && col.decl_type.trim().eq_ignore_ascii_case("INTEGER"));

    let has_remarks_column = columns
        .iter()
        .any(|c| c.name.eq_ignore_ascii_case("remarks"));

    Ok(TableCapabilities {
        has_auto_increment_id,
        has_remarks_column,
    })
}

// --- Id assignment ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdAssignment {
    /// Storage engine assigns the id; read it back after insert.
    Engine,
    /// Insert with this id.
    Explicit(i64),
}

pub async fn next_id(pool: &SqlitePool, caps: &TableCapabilities) -> IdAssignment {
    if caps.has_auto_increment_id {
        return IdAssignment::Engine;
    }
    let sql = format!("SELECT COALESCE(MAX(query_id), 0) + 1 FROM {TABLE}");
    match sqlx::query_scalar::<_, i64>(&sql).fetch_one(pool).await {
        Ok(id) => IdAssignment::Explicit(id),
        Err(e) => {
            // Not collision-safe; only reached when the MAX lookup itself fails.
            let fallback = Local::now().timestamp();
            warn!("Next id lookup failed, using timestamp id {fallback}: {e}");
            IdAssignment::Explicit(fallback)
        }
    }
}

// --- Tickets ---

const ORDER_NEWEST_FIRST: &str = " ORDER BY created_at DESC, query_id DESC";

fn ticket_columns(caps: &TableCapabilities) -> String {
    let remarks = if caps.has_remarks_column {
        "COALESCE(remarks, '')"
    } else {
        "NULL"
    };
    format!(
        "query_id, COALESCE(name, '') AS name, COALESCE(email, '') AS email, \
         COALESCE(mobile, '') AS mobile, COALESCE(query_heading, '') AS query_heading, \
         COALESCE(query_description, '') AS query_description, \
         COALESCE(status, '') AS status, CAST(created_at AS TEXT) AS created_at, \
         CAST(closed_at AS TEXT) AS closed_at, {remarks} AS remarks"
    )
}

#[derive(FromRow)]
struct TicketRow {
    query_id: i64,
    name: String,
    email: String,
    mobile: String,
    query_heading: String,
    query_description: String,
    status: String,
    created_at: Option<String>,
    closed_at: Option<String>,
    remarks: Option<String>,
}

impl From<TicketRow> for Ticket {
    fn from(r: TicketRow) -> Self {
        Ticket {
            query_id: r.query_id,
            name: r.name,
            email: r.email,
            mobile: r.mobile,
            query_heading: r.query_heading,
            query_description: r.query_description,
            status: r.status,
            created_at: r.created_at.as_deref().and_then(parse_timestamp),
            closed_at: r.closed_at.as_deref().and_then(parse_timestamp),
            remarks: r.remarks,
        }
    }
}

/// Lenient timestamp parsing; unparseable values become `None`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_local()))
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

pub async fn create_ticket(
    pool: &SqlitePool,
    caps: &TableCapabilities,
    ticket: &NewTicket,
) -> Result<i64> {
    let created_at = Local::now().naive_local();
    let id = match next_id(pool, caps).await {
        IdAssignment::Engine => {
            let sql = format!(
                "INSERT INTO {TABLE} (name, email, mobile, query_heading, query_description, status, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)"
            );
            let result = sqlx::query(&sql)
                .bind(&ticket.name)
                .bind(&ticket.email)
                .bind(&ticket.mobile)
                .bind(&ticket.query_heading)
                .bind(&ticket.query_description)
                .bind(STATUS_OPEN)
                .bind(created_at)
                .execute(pool)
                .await?;
            result.last_insert_rowid()
        }
        IdAssignment::Explicit(id) => {
            let sql = format!(
                "INSERT INTO {TABLE} (query_id, name, email, mobile, query_heading, query_description, status, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
            );
            sqlx::query(&sql)
                .bind(id)
                .bind(&ticket.name)
                .bind(&ticket.email)
                .bind(&ticket.mobile)
                .bind(&ticket.query_heading)
                .bind(&ticket.query_description)
                .bind(STATUS_OPEN)
                .bind(created_at)
                .execute(pool)
                .await?;
            id
        }
    };
    info!("Ticket {id} created for {}", ticket.email);
    Ok(id)
}

pub async fn find_tickets(
    pool: &SqlitePool,
    caps: &TableCapabilities,
    filter: &TicketFilter,
) -> Result<Vec<Ticket>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM {TABLE} WHERE 1=1",
        ticket_columns(caps)
    ));
    if let Some(name) = non_empty(&filter.name) {
        qb.push(" AND name = ").push_bind(name.to_string());
    }
    if let Some(email) = non_empty(&filter.email) {
        qb.push(" AND email = ").push_bind(email.to_string());
    }
    if let Some(mobile) = non_empty(&filter.mobile) {
        qb.push(" AND mobile = ").push_bind(mobile.to_string());
    }
    if let StatusFilter::Only(status) = &filter.status {
        qb.push(" AND COALESCE(status, '') = ").push_bind(status.clone());
    }
    qb.push(ORDER_NEWEST_FIRST);

    let rows = qb.build_query_as::<TicketRow>().fetch_all(pool).await?;
    Ok(rows.into_iter().map(Ticket::from).collect())
}

pub async fn find_open_by_contact(
    pool: &SqlitePool,
    caps: &TableCapabilities,
    email: &str,
    mobile: &str,
) -> Result<Vec<Ticket>> {
    let sql = format!(
        "SELECT {} FROM {TABLE} WHERE (email = ? OR mobile = ?) AND COALESCE(status, '') = ?{ORDER_NEWEST_FIRST}",
        ticket_columns(caps)
    );
    let rows = sqlx::query_as::<_, TicketRow>(&sql)
        .bind(email)
        .bind(mobile)
        .bind(STATUS_OPEN)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(Ticket::from).collect())
}

pub async fn list_all(pool: &SqlitePool, caps: &TableCapabilities) -> Result<Vec<Ticket>> {
    let sql = format!(
        "SELECT {} FROM {TABLE}{ORDER_NEWEST_FIRST}",
        ticket_columns(caps)
    );
    let rows = sqlx::query_as::<_, TicketRow>(&sql).fetch_all(pool).await?;
    Ok(rows.into_iter().map(Ticket::from).collect())
}

pub async fn get_ticket(
    pool: &SqlitePool,
    caps: &TableCapabilities,
    query_id: i64,
) -> Result<Option<Ticket>> {
    let sql = format!(
        "SELECT {} FROM {TABLE} WHERE query_id = ?",
        ticket_columns(caps)
    );
    let row = sqlx::query_as::<_, TicketRow>(&sql)
        .bind(query_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Ticket::from))
}

/// Set status and remarks; `closed_at` follows the new status.
/// Returns false when no row has `query_id`.
pub async fn update_status(
    pool: &SqlitePool,
    caps: &TableCapabilities,
    query_id: i64,
    status: &str,
    remarks: &str,
) -> Result<bool> {
    let closed_at = is_closed_status(status).then(|| Local::now().naive_local());
    let result = if caps.has_remarks_column {
        let sql = format!(
            "UPDATE {TABLE} SET status = ?, closed_at = ?, remarks = ? WHERE query_id = ?"
        );
        sqlx::query(&sql)
            .bind(status)
            .bind(closed_at)
            .bind(remarks)
            .bind(query_id)
            .execute(pool)
            .await?
    } else {
        let sql = format!("UPDATE {TABLE} SET status = ?, closed_at = ? WHERE query_id = ?");
        sqlx::query(&sql)
            .bind(status)
            .bind(closed_at)
            .bind(query_id)
            .execute(pool)
            .await?
    };
    let updated = result.rows_affected() > 0;
    if updated {
        info!("Ticket {query_id} set to '{status}'");
    }
    Ok(updated)
}
