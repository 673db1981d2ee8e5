//! Identity hook for the handshake.
//!
//! Quizhall does not authenticate anyone: a participant names itself with
//! a stable identity string and the server trusts it. The [`Authenticator`]
//! trait is the seam where a deployment can plug in something stricter.

use quizhall_protocol::ParticipantId;

use crate::SessionError;

/// Validates the identity a client presents in its handshake.
///
/// # Example
///
/// ```rust
/// use quizhall_protocol::ParticipantId;
/// use quizhall_session::{Authenticator, SessionError};
///
/// /// Only lets in identities from a fixed guest list.
/// struct GuestList(Vec<String>);
///
/// impl Authenticator for GuestList {
///     async fn authenticate(
///         &self,
///         identity: Option<&str>,
///     ) -> Result<ParticipantId, SessionError> {
///         let id = identity.unwrap_or_default();
///         if self.0.iter().any(|g| g == id) {
///             Ok(ParticipantId::from(id))
///         } else {
///             Err(SessionError::AuthFailed(format!("{id} is not invited")))
///         }
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates the handshake identity and returns the participant id.
    fn authenticate(
        &self,
        identity: Option<&str>,
    ) -> impl std::future::Future<Output = Result<ParticipantId, SessionError>> + Send;
}

/// Accepts any non-blank caller-supplied identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallerIdentity;

impl CallerIdentity {
    /// Longest identity accepted, in bytes.
    pub const MAX_LEN: usize = 128;
}

impl Authenticator for CallerIdentity {
    async fn authenticate(
        &self,
        identity: Option<&str>,
    ) -> Result<ParticipantId, SessionError> {
        let id = identity.map(str::trim).unwrap_or_default();
        if id.is_empty() {
            return Err(SessionError::AuthFailed("identity is required".into()));
        }
        if id.len() > Self::MAX_LEN {
            return Err(SessionError::AuthFailed(format!(
                "identity longer than {} bytes",
                Self::MAX_LEN
            )));
        }
        Ok(ParticipantId::from(id))
    }
}
