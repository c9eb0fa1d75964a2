mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use router::{handle_request, handle_tick};
pub use types::{AppState, Inbound, Request};
