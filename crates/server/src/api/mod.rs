pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod settings;
pub mod stream;
pub mod torrents;
pub mod ws;

pub use error::{ApiError, ErrorResponse, OutcomeResponse};
pub use routes::create_router;
pub use ws::{WsBroadcaster, WsMessage};
