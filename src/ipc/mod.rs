mod cache;
mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use cache::RosterCache;
pub use router::handle_request;
pub use types::{AppState, Request};
