//! What the authentication extractor needs from application state.

use crate::session::SessionService;

pub trait HasSessionService {
    fn sessions(&self) -> &SessionService;

    /// Whether cookies written back carry the `Secure` attribute.
    fn secure_cookies(&self) -> bool;

    /// Trust `X-Forwarded-For` for the client address.
    fn trust_forwarded(&self) -> bool {
        false
    }
}

/// Implement `HasSessionService` for a state struct with
/// `sessions: SessionService` and `secure_cookies: bool` fields.
#[macro_export]
macro_rules! impl_has_session_service {
    ($state_type:ty) => {
        impl $crate::auth::HasSessionService for $state_type {
            fn sessions(&self) -> &$crate::session::SessionService {
                &self.sessions
            }
            fn secure_cookies(&self) -> bool {
                self.secure_cookies
            }
        }
    };
}
