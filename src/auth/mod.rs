pub mod listener;
pub mod verify;

pub use listener::{handle_auth_event, AuthEvent, AuthEventAck};
pub use verify::{bearer_token, AuthContext, SessionVerifier};
