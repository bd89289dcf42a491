mod google;
mod traits;

pub use google::{GoogleOAuthEndpoints, GoogleProvider};
pub use traits::{token_expiry, OAuthProvider, TokenInfo, TokenSet};
