mod engine;

pub use engine::{CryptoEngine, TokenKind, STATE_MAX_AGE_SECS, STATE_MAX_SKEW_SECS};
