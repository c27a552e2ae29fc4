pub mod config;
pub mod methods;
pub mod server;
