use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const STATUS_OPEN: &str = "open";
pub const STATUS_IN_PROGRESS: &str = "In Progress";
pub const STATUS_CLOSED: &str = "closed";

/// Statuses support can always pick, in menu order.
pub const STATUS_MENU: [&str; 3] = [STATUS_OPEN, STATUS_IN_PROGRESS, STATUS_CLOSED];

/// Display format for `created_at` / `closed_at`.
pub const TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// True when `status` means the ticket is closed (case-insensitive).
pub fn is_closed_status(status: &str) -> bool {
    status.eq_ignore_ascii_case(STATUS_CLOSED)
}

/// One row of `customer_data`.
///
/// `remarks` is `None` when the table has no remarks column; a NULL remark in a
/// table that has the column is shaped to `Some("")`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub query_id: i64,
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub query_heading: String,
    pub query_description: String,
    pub status: String,
    pub created_at: Option<NaiveDateTime>,
    pub closed_at: Option<NaiveDateTime>,
    pub remarks: Option<String>,
}

impl Ticket {
    pub fn view(&self) -> TicketView {
        TicketView::from(self)
    }
}

/// Display row: timestamps rendered as text, absent values as "".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketView {
    pub query_id: i64,
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub query_heading: String,
    pub query_description: String,
    pub status: String,
    pub created_at: String,
    pub closed_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

fn format_timestamp(ts: Option<NaiveDateTime>) -> String {
    ts.map(|t| t.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

impl From<&Ticket> for TicketView {
    fn from(t: &Ticket) -> Self {
        TicketView {
            query_id: t.query_id,
            name: t.name.clone(),
            email: t.email.clone(),
            mobile: t.mobile.clone(),
            query_heading: t.query_heading.clone(),
            query_description: t.query_description.clone(),
            status: t.status.clone(),
            created_at: format_timestamp(t.created_at),
            closed_at: format_timestamp(t.closed_at),
            remarks: t.remarks.clone(),
        }
    }
}

/// Fields a client submits when raising a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTicket {
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub query_heading: String,
    pub query_description: String,
}

/// Status constraint for lookups. `All` applies no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    Only(String),
}

impl StatusFilter {
    /// Boundary parsing: absent, blank or the literal `all` mean no constraint.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some("all") => StatusFilter::All,
            Some(s) => StatusFilter::Only(s.to_string()),
        }
    }

    pub fn matches(&self, status: &str) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(s) => s == status,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Only(s) => s,
        }
    }
}

/// Optional lookup filters; `None` (or an empty string) is not applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketFilter {
    pub name: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    #[serde(default)]
    pub status: StatusFilter,
}

/// Schema features detected on `customer_data`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCapabilities {
    pub has_auto_increment_id: bool,
    pub has_remarks_column: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Support,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Support => write!(f, "support"),
        }
    }
}

/// Who a successful login resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Identity {
    Client {
        username: String,
        email: String,
        mobile: String,
    },
    Support {
        username: String,
    },
}

impl Identity {
    pub fn role(&self) -> Role {
        match self {
            Identity::Client { .. } => Role::Client,
            Identity::Support { .. } => Role::Support,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Identity::Client { username, .. } | Identity::Support { username } => username,
        }
    }
}
