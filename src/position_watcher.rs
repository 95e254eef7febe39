use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::location_service::{LocationError, LocationEvent, LocationService, WatchId, WatchOptions};
use crate::position::Position;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WatcherState {
    pub position: Option<Position>,
    pub allowed_geolocation: bool,
    pub error: Option<LocationError>,
}

impl WatcherState {
    fn apply(&mut self, event: LocationEvent) {
        match event {
            LocationEvent::Update(position) => {
                self.position = Some(position);
                self.allowed_geolocation = true;
            }
            LocationEvent::Error(error) => {
                if error.is_permission_denied() {
                    self.allowed_geolocation = false;
                } else {
                    self.error = Some(error);
                }
            }
        }
    }
}

/// An active platform watch. Dropping it clears the watch; anything the
/// platform still delivers afterwards is ignored.
pub struct LocationSubscription {
    id: WatchId,
    armed: Arc<AtomicBool>,
    state: Arc<Mutex<WatcherState>>,
    service: Arc<dyn LocationService>,
}

impl LocationSubscription {
    fn start(
        service: Arc<dyn LocationService>,
        options: WatchOptions,
        state: Arc<Mutex<WatcherState>>,
    ) -> Result<Self> {
        let armed = Arc::new(AtomicBool::new(true));
        let callback_armed = armed.clone();
        let callback_state = state.clone();
        let id = service.watch_position(
            options,
            Box::new(move |event| {
                let mut state = callback_state.lock().unwrap();
                if callback_armed.load(Ordering::SeqCst) {
                    state.apply(event);
                }
            }),
        )?;
        Ok(LocationSubscription {
            id,
            armed,
            state,
            service,
        })
    }

    pub fn id(&self) -> WatchId {
        self.id
    }
}

impl Drop for LocationSubscription {
    fn drop(&mut self) {
        // disarm under the state lock so an in-flight callback either lands
        // before this returns or not at all
        {
            let _state = self.state.lock().unwrap();
            self.armed.store(false, Ordering::SeqCst);
        }
        self.service.clear_watch(self.id);
    }
}

pub struct PositionWatcher {
    service: Arc<dyn LocationService>,
    options: WatchOptions,
    state: Arc<Mutex<WatcherState>>,
    subscription: Option<LocationSubscription>,
}

impl PositionWatcher {
    pub fn new(service: Arc<dyn LocationService>, options: WatchOptions) -> Self {
        PositionWatcher {
            service,
            options,
            state: Arc::new(Mutex::new(WatcherState::default())),
            subscription: None,
        }
    }

    /// Meant to be called on an explicit user action. Replaces any watch
    /// that is already running.
    pub fn request_geolocation(&mut self) -> Result<()> {
        // release the previous watch before asking for a new one
        self.subscription = None;
        let subscription =
            LocationSubscription::start(self.service.clone(), self.options, self.state.clone())?;
        info!("geolocation requested, watch id = {:?}", subscription.id());
        self.subscription = Some(subscription);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            info!("stopping watch {:?}", subscription.id());
        }
    }

    pub fn is_watching(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn state(&self) -> WatcherState {
        self.state.lock().unwrap().clone()
    }
}
