mod middleware;
mod password;
mod token;

pub use middleware::{AuthError, RequireUser, Viewer, bearer_or_cookie_token, cookie_value};
pub use password::PasswordHasher;
pub use token::{ACCESS_COOKIE, Claims, REFRESH_COOKIE, TokenKind, TokenSigner};
