use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Lifecycle state shared by quiz sessions and Leitner review sessions.
///
/// `InProgress` is the only mutable state; `Completed` and `Abandoned` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(SessionStatus::InProgress),
            "completed" => Some(SessionStatus::Completed),
            "abandoned" => Some(SessionStatus::Abandoned),
            _ => None,
        }
    }

    /// Terminal states admit no further mutation.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }
}

/// How long an in-progress session may idle before the timeout sweep
/// abandons it.
#[must_use]
pub fn session_timeout() -> Duration {
    Duration::hours(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_string_roundtrip() {
        for status in [
            SessionStatus::InProgress,
            SessionStatus::Completed,
            SessionStatus::Abandoned,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SessionStatus::parse("done"), None);
    }

    #[test]
    fn only_in_progress_is_mutable() {
        assert!(!SessionStatus::InProgress.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Abandoned.is_terminal());
    }
}
