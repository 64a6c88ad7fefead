//! Thin HTTP front end: the bundled UI, the brand configuration and `POST /oauth`.

mod config;
mod http;
mod server;

pub use config::ServerConfig;
pub use server::{router, serve};
