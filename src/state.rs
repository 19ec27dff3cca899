//! Shared application state

use crate::config::ServerConfig;

/// State shared by every connection handler
#[derive(Debug)]
pub struct AppState {
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }
}
