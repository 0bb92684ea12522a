pub mod app;
pub mod config;
pub mod routes;
pub mod server;
pub mod telemetry;

pub use app::start_app;
