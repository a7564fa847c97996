use std::sync::Arc;

use crate::config::Config;
use crate::scheduler::DownloadScheduler;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub scheduler: DownloadScheduler,
}

impl AppState {
    pub fn new(config: Config, scheduler: DownloadScheduler) -> Self {
        Self {
            config: Arc::new(config),
            scheduler,
        }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.config.api.max_payload_bytes.as_usize()
    }
}
