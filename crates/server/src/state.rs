use std::sync::Arc;
use popcorn_core::{Config, Lifecycle, PopcornService, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    service: PopcornService,
    lifecycle: Arc<Lifecycle>,
}

impl AppState {
    pub fn new(config: Config, service: PopcornService, lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            config,
            service,
            lifecycle,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn service(&self) -> &PopcornService {
        &self.service
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
}
