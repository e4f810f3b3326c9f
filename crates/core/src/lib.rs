//! Ticket desk service: who may do what, and what each action does to the
//! ticket table and the caller's session.

pub mod auth;
pub mod desk;
pub mod error;
pub mod session;

pub use auth::{ClientAccount, CredentialProvider, StaticCredentials};
pub use desk::{CreatedTicket, Desk, SelectedTicket, SupportBoard};
pub use error::{DeskError, DeskResult};
pub use session::{Session, SessionId, SessionStore, TicketDraft};
