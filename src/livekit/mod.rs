//! LiveKit integration: room adapter and access tokens.

mod room;
pub mod token;

pub use room::LiveKitRoom;
pub use token::{DEFAULT_TOKEN_TTL, generate_access_token};
