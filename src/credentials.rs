//! Access credentials for the change feed transport.

use crate::types::AccessToken;
use parking_lot::RwLock;

/// Supplies the credential to apply when a channel joins the feed.
///
/// Sessions rotate their token, so providers are read at join time rather
/// than once when the feed is created.
pub trait CredentialProvider: Send + Sync {
    fn access_token(&self) -> Option<AccessToken>;
}

/// A fixed credential (or none).
#[derive(Clone, Debug, Default)]
pub struct StaticCredentials(pub Option<AccessToken>);

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        StaticCredentials(Some(AccessToken::new(token)))
    }

    pub fn none() -> Self {
        StaticCredentials(None)
    }
}

impl CredentialProvider for StaticCredentials {
    fn access_token(&self) -> Option<AccessToken> {
        self.0.clone()
    }
}

/// The signed-in session's credential, replaced whenever it is refreshed.
#[derive(Debug, Default)]
pub struct SessionCredentials {
    token: RwLock<Option<AccessToken>>,
}

impl SessionCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rotate(&self, token: impl Into<String>) {
        *self.token.write() = Some(AccessToken::new(token));
    }

    pub fn sign_out(&self) {
        *self.token.write() = None;
    }
}

impl CredentialProvider for SessionCredentials {
    fn access_token(&self) -> Option<AccessToken> {
        self.token.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_rotation() {
        let session = SessionCredentials::new();
        assert!(session.access_token().is_none());

        session.rotate("first");
        session.rotate("second");
        assert_eq!(session.access_token(), Some(AccessToken::new("second")));

        session.sign_out();
        assert!(session.access_token().is_none());
    }
}
