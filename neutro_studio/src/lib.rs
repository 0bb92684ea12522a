pub mod app;
pub mod config;
pub mod page;
pub mod routes;
pub mod server;

pub use app::start_app;
