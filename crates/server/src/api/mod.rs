pub mod error;
pub mod handlers;
pub mod jobs;
pub mod library;
pub mod middleware;
pub mod recheck;
pub mod routes;
pub mod signals;
pub mod ws;

pub use routes::create_router;
pub use ws::WsMessage;
