use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use querydesk_models::{Identity, Role, StatusFilter};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub type SessionId = Uuid;

/// Sessions untouched for this long are dropped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Everything one connected user has on screen: both role panels, their
/// identities, form values and filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Session {
    pub client: ClientSession,
    pub support: SupportSession,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientSession {
    pub authenticated: bool,
    pub username: String,
    pub email: String,
    pub mobile: String,
    pub draft: TicketDraft,
    pub check: CheckFilters,
}

/// Values of the "raise a new query" form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub mobile: String,
    #[serde(default)]
    pub query_heading: String,
    #[serde(default)]
    pub query_description: String,
    #[serde(default)]
    pub confirmed: bool,
}

/// Last-used filters of the client's status check.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckFilters {
    pub status: StatusFilter,
    pub complaint_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SupportSession {
    pub authenticated: bool,
    pub username: String,
    pub selected_id: Option<i64>,
    pub status_filter: StatusFilter,
}

impl Session {
    pub fn sign_in(&mut self, identity: &Identity) {
        match identity {
            Identity::Client {
                username,
                email,
                mobile,
            } => {
                self.client.authenticated = true;
                self.client.username = username.clone();
                self.client.email = email.clone();
                self.client.mobile = mobile.clone();
            }
            Identity::Support { username } => {
                self.support.authenticated = true;
                self.support.username = username.clone();
            }
        }
    }

    /// Drop the identity for `role`. Form values and filters survive.
    pub fn sign_out(&mut self, role: Role) {
        match role {
            Role::Client => {
                self.client.authenticated = false;
                self.client.username.clear();
                self.client.email.clear();
                self.client.mobile.clear();
            }
            Role::Support => {
                self.support.authenticated = false;
                self.support.username.clear();
                self.support.selected_id = None;
            }
        }
    }

    /// True once neither role is signed in.
    pub fn is_signed_out(&self) -> bool {
        !self.client.authenticated && !self.support.authenticated
    }

    pub fn is_authenticated(&self, role: Role) -> bool {
        match role {
            Role::Client => self.client.authenticated,
            Role::Support => self.support.authenticated,
        }
    }

    pub fn identity(&self, role: Role) -> Option<Identity> {
        if !self.is_authenticated(role) {
            return None;
        }
        Some(match role {
            Role::Client => Identity::Client {
                username: self.client.username.clone(),
                email: self.client.email.clone(),
                mobile: self.client.mobile.clone(),
            },
            Role::Support => Identity::Support {
                username: self.support.username.clone(),
            },
        })
    }
}

#[derive(Debug, Clone)]
struct Entry {
    session: Session,
    last_seen: Instant,
}

/// Per-user sessions keyed by an opaque id. Nothing is persisted; entries
/// idle for longer than the timeout are evicted.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<SessionId, Entry>>>,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::default(),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    fn expired(&self, entry: &Entry, now: Instant) -> bool {
        now.duration_since(entry.last_seen) >= self.idle_timeout
    }

    /// Store a new session. Expired entries are swept first.
    pub async fn insert(&self, session: Session) -> SessionId {
        let id = Uuid::new_v4();
        let now = Instant::now();
        let mut sessions = self.inner.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| !self.expired(entry, now));
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!("Evicted {evicted} idle session(s)");
        }
        sessions.insert(
            id,
            Entry {
                session,
                last_seen: now,
            },
        );
        id
    }

    /// Fetch a live session and mark it as seen. An expired one is removed.
    pub async fn get(&self, id: &SessionId) -> Option<Session> {
        let now = Instant::now();
        let mut sessions = self.inner.write().await;
        let entry = sessions.get_mut(id)?;
        if self.expired(entry, now) {
            sessions.remove(id);
            debug!("Session {id} expired");
            return None;
        }
        entry.last_seen = now;
        Some(entry.session.clone())
    }

    /// Store `session` under an existing id. Returns false if the id is unknown.
    pub async fn put(&self, id: &SessionId, session: Session) -> bool {
        match self.inner.write().await.get_mut(id) {
            Some(entry) => {
                entry.session = session;
                entry.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: &SessionId) -> Option<Session> {
        self.inner.write().await.remove(id).map(|entry| entry.session)
    }

    /// Number of stored entries, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}
