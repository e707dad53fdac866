//! Identification of the callers of kportal requests.
//!
//! The portal never verifies credentials itself: a session layer in front of it completes
//! the login flow with the identity provider and attaches the authenticated identity to requests.
//! This crate defines how that information is extracted and turned into a [`Caller`].
//!
//! [`Caller`]: kportal_context::Caller
pub mod header;
pub mod identity;

pub use self::identity::Authentication;
pub use self::identity::AuthenticationFactory;
pub use self::identity::Authenticator;
pub use self::identity::IdentityReader;
