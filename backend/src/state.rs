use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::{config::Config, resolver::MediaResolver};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub resolver: Arc<dyn MediaResolver>,
    pub download_slots: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: Config, resolver: Arc<dyn MediaResolver>) -> Self {
        let download_slots = Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1)));
        Self {
            config: Arc::new(config),
            resolver,
            download_slots,
        }
    }
}
