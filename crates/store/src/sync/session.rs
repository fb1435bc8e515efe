//! Authentication context injected into collection services.

use secrecy::SecretString;

/// Who the current session belongs to.
///
/// The store only needs to know whether a user is signed in; the token is
/// passed through to the backend untouched.
#[derive(Clone, Default)]
pub struct Session {
    token: Option<SecretString>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

impl Session {
    /// A signed-out session. Collections stay local.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { token: None }
    }

    /// A signed-in session holding the backend bearer token.
    #[must_use]
    pub const fn authenticated(token: SecretString) -> Self {
        Self { token: Some(token) }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    #[must_use]
    pub const fn token(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_states() {
        assert!(!Session::anonymous().is_authenticated());
        assert!(!Session::default().is_authenticated());
        let session = Session::authenticated(SecretString::from("tok_8f2a91c7d3e4"));
        assert!(session.is_authenticated());
        assert!(!format!("{session:?}").contains("tok_"));
    }
}
