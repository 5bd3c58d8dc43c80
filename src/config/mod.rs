mod server;

pub use server::{AuthConfig, ServerConfig};
