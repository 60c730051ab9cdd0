pub mod connection;
pub mod error;
pub mod memory;
pub mod repositories;
pub mod store;

pub use connection::{Database, DatabaseConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_MIN_CONNECTIONS};
pub use error::{DatabaseError, Result};
pub use memory::InMemorySessionStore;
pub use repositories::sessions::SessionRepository;
pub use store::{ChainOutcome, PriorState, SessionStore, TokenSuccessor};
