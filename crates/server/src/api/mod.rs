pub mod error;
pub mod fs;
pub mod handlers;
pub mod history;
pub mod middleware;
pub mod routes;
pub mod rules;
pub mod tasks;

pub use routes::create_router;
