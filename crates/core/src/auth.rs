use std::collections::HashMap;

use querydesk_models::{Identity, Role};

/// Resolves submitted credentials to an identity.
pub trait CredentialProvider: Send + Sync {
    fn verify(&self, role: Role, username: &str, password: &str) -> Option<Identity>;
}

#[derive(Debug, Clone)]
pub struct ClientAccount {
    pub password: String,
    pub email: String,
    pub mobile: String,
}

/// Fixed in-memory credential tables. Demo-grade: plaintext, no lockout.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    clients: HashMap<String, ClientAccount>,
    support_username: String,
    support_password: String,
}

impl StaticCredentials {
    pub fn new(
        clients: HashMap<String, ClientAccount>,
        support_username: impl Into<String>,
        support_password: impl Into<String>,
    ) -> Self {
        Self {
            clients,
            support_username: support_username.into(),
            support_password: support_password.into(),
        }
    }

    /// The five demo clients and the single support account.
    pub fn demo() -> Self {
        let clients = [
            ("selva", "1111", "selva@gmail.com", "9000000001"),
            ("sri", "2222", "sri@gmail.com", "9000000002"),
            ("naveen", "3333", "naveen@gmail.com", "9000000003"),
            ("rishi", "4444", "rishi@gmail.com", "9000000004"),
            ("rizwan", "5555", "rizwan@gmail.com", "9000000005"),
        ]
        .into_iter()
        .map(|(user, password, email, mobile)| {
            (
                user.to_string(),
                ClientAccount {
                    password: password.to_string(),
                    email: email.to_string(),
                    mobile: mobile.to_string(),
                },
            )
        })
        .collect();
        Self::new(clients, "Support", "1234")
    }
}

impl Default for StaticCredentials {
    fn default() -> Self {
        Self::demo()
    }
}

impl CredentialProvider for StaticCredentials {
    fn verify(&self, role: Role, username: &str, password: &str) -> Option<Identity> {
        match role {
            Role::Client => self
                .clients
                .get(username)
                .filter(|account| account.password == password)
                .map(|account| Identity::Client {
                    username: username.to_string(),
                    email: account.email.clone(),
                    mobile: account.mobile.clone(),
                }),
            Role::Support => (username == self.support_username
                && password == self.support_password)
                .then(|| Identity::Support {
                    username: username.to_string(),
                }),
        }
    }
}
