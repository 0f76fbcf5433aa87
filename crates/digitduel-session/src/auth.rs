//! Authentication seam.
//!
//! Identity issuance and verification live outside Digit Duel. Whatever
//! does that work (a gateway, an OAuth provider, a signed-cookie check)
//! plugs in here by implementing [`Authenticator`].

use digitduel_protocol::Identity;

use crate::SessionError;

/// Validates a client's handshake token and returns who they are.
///
/// `Send + Sync + 'static` because a single authenticator is shared by
/// every connection task for the life of the server.
///
/// # Example
///
/// ```rust
/// use digitduel_protocol::Identity;
/// use digitduel_session::{Authenticator, SessionError};
///
/// struct FixedAuthenticator;
///
/// impl Authenticator for FixedAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
///         match token {
///             "ada-secret" => Ok(Identity::new("ada", "Ada")),
///             _ => Err(SessionError::AuthFailed("unknown token".into())),
///         }
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Called once per connection with the token from the `handshake` frame.
    ///
    /// # Returns
    /// - `Ok(Identity)` — the verified caller
    /// - `Err(SessionError::AuthFailed)` — token rejected
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Identity, SessionError>> + Send;
}

/// Accepts tokens of the form `user-id` or `user-id:Display Name`.
///
/// For deployments where an upstream gateway has already verified the
/// caller and forwards the identity as the token. The id must be non-empty
/// and free of whitespace; the display name defaults to the id.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustedTokenAuthenticator;

impl Authenticator for TrustedTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
        let (id, name) = match token.split_once(':') {
            Some((id, name)) => (id.trim(), name.trim()),
            None => (token.trim(), ""),
        };
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(SessionError::AuthFailed("token carries no user id".into()));
        }
        let name = if name.is_empty() { id } else { name };
        Ok(Identity::new(id, name))
    }
}
