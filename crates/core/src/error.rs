/// Failure of one desk action. The session and any displayed data stay valid.
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    /// Input rejected before any storage call; one message per violation.
    #[error("{}", .0.join(" "))]
    Validation(Vec<String>),

    #[error("{0}")]
    Unauthorized(String),

    #[error("No complaint found with ID {0}.")]
    NotFound(i64),

    /// Storage failure, with the underlying error text kept verbatim.
    #[error("{context}: {message}")]
    Storage {
        context: &'static str,
        message: String,
    },
}

pub type DeskResult<T> = Result<T, DeskError>;

impl DeskError {
    pub fn validation(message: impl Into<String>) -> Self {
        DeskError::Validation(vec![message.into()])
    }

    /// Adapter for `map_err` on storage calls.
    pub fn storage(context: &'static str) -> impl FnOnce(anyhow::Error) -> DeskError {
        move |e| DeskError::Storage {
            context,
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_violation() {
        let err = DeskError::Validation(vec![
            "Please fill required fields: Name, Email".into(),
            "Please tick the confirmation checkbox.".into(),
        ]);

        assert_eq!(
            err.to_string(),
            "Please fill required fields: Name, Email Please tick the confirmation checkbox."
        );
    }

    #[test]
    fn storage_message_keeps_underlying_text() {
        let err = DeskError::storage("Update failed")(anyhow::anyhow!("database is locked"));

        assert_eq!(err.to_string(), "Update failed: database is locked");
    }
}
