use anyhow::Result;
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::location_service::LocationService;
use crate::position_watcher::{PositionWatcher, WatcherState};
use crate::table_service::TableService;
use crate::video_catalog::{VideoCatalog, VideoRecord};
use crate::view::{self, ViewModel};

/// Everything one user session needs. Services are handed in by the caller,
/// and dropping the session releases the location watch.
pub struct Session {
    config: Config,
    table_service: Arc<dyn TableService>,
    watcher: Mutex<PositionWatcher>,
    catalog: VideoCatalog,
}

impl Session {
    pub fn new(
        config: Config,
        location_service: Arc<dyn LocationService>,
        table_service: Arc<dyn TableService>,
    ) -> Self {
        let watcher = PositionWatcher::new(location_service, config.watch);
        Session {
            config,
            table_service,
            watcher: Mutex::new(watcher),
            catalog: VideoCatalog::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch errors leave the catalog empty. The error is still returned so
    /// callers can log or ignore it.
    pub fn load_catalog(&self) -> Result<()> {
        self.catalog
            .reload(self.table_service.as_ref(), &self.config.table.table)
    }

    pub fn request_geolocation(&self) -> Result<()> {
        self.watcher.lock().unwrap().request_geolocation()
    }

    pub fn stop_geolocation(&self) {
        self.watcher.lock().unwrap().stop()
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().unwrap().is_watching()
    }

    pub fn watcher_state(&self) -> WatcherState {
        self.watcher.lock().unwrap().state()
    }

    pub fn records(&self) -> Vec<VideoRecord> {
        self.catalog.records()
    }

    pub fn view(&self) -> ViewModel {
        let state = self.watcher_state();
        let records = self.catalog.records();
        view::build_view(&state, &records, self.config.shared_view_url.as_deref())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!("session dropped");
        self.stop_geolocation();
    }
}
