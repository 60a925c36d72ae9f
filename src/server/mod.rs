pub mod http;
pub mod routes;

pub use http::start_server;
