//! HTTP surface of the query desk.

pub mod api;
pub mod error;

pub use api::{AppState, router};
pub use error::{AppError, AppResult};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("QUERYDESK_GIT_HASH");

pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH})")
}
