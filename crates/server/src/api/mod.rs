pub mod error;
pub mod handlers;
pub mod image;
pub mod middleware;
pub mod routes;
pub mod tracker;

pub use error::ApiError;
pub use routes::create_router;
