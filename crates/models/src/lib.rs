pub mod refresh_token;
pub mod session;

pub use refresh_token::{NewRefreshToken, RefreshToken, TokenState};
pub use session::{NewSession, RevocationReason, Session, SessionSummary};
