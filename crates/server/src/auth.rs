//! Session authentication.
//!
//! The real session check lives on an external service; the server only
//! depends on this trait. Implementations run on the blocking handshake
//! thread, so they may perform I/O.

/// Checks whether a session id/username pair is valid.
pub trait Authenticator: Send + Sync {
    /// True when the login may proceed.
    fn authenticate(&self, session_id: &str, username: &str) -> bool;
}

/// Accepts every syntactically valid login. Used when no external session
/// service is configured.
pub struct AllowAllAuthenticator;

impl Authenticator for AllowAllAuthenticator {
    fn authenticate(&self, _session_id: &str, _username: &str) -> bool {
        true
    }
}

/// Usernames may only contain characters that are safe in filenames.
pub fn valid_username(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_validation() {
        assert!(valid_username("alice"));
        assert!(valid_username("Player_1"));
        assert!(valid_username("-dash-"));
        assert!(!valid_username(""));
        assert!(!valid_username("bad name"));
        assert!(!valid_username("dots.are.bad"));
        assert!(!valid_username("../../etc/passwd"));
        assert!(!valid_username("über"));
    }

    #[test]
    fn allow_all_allows() {
        assert!(AllowAllAuthenticator.authenticate("0123456789abcdef", "alice"));
    }
}
