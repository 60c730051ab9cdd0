pub mod clock;
pub mod error;
pub mod policy;
pub mod refresh;
pub mod session;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, SessionError};
pub use policy::SessionPolicy;
pub use refresh::{RefreshTokenService, RotationResult};
pub use session::{CreatedSession, IssuedRefreshToken, SessionService, SessionValidation};
pub use token::{GeneratedToken, RefreshSecret};
