use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strum_macros::EnumIter;

use crate::position::Position;

/// Error codes follow `GeolocationPositionError` so they can be forwarded
/// from a browser untouched.
#[derive(Copy, Clone, Debug, EnumIter, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum LocationErrorCode {
    PermissionDenied = 1,
    PositionUnavailable = 2,
    Timeout = 3,
}

impl LocationErrorCode {
    pub fn to_int(&self) -> u16 {
        *self as u16
    }

    pub fn of_int(i: u16) -> Result<Self> {
        match i {
            1 => Ok(LocationErrorCode::PermissionDenied),
            2 => Ok(LocationErrorCode::PositionUnavailable),
            3 => Ok(LocationErrorCode::Timeout),
            _ => bail!("Invalid int for `LocationErrorCode` {}", i),
        }
    }
}

#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum LocationError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("timeout expired: {0}")]
    Timeout(String),
}

impl LocationError {
    pub fn new(code: LocationErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            LocationErrorCode::PermissionDenied => LocationError::PermissionDenied(message),
            LocationErrorCode::PositionUnavailable => LocationError::PositionUnavailable(message),
            LocationErrorCode::Timeout => LocationError::Timeout(message),
        }
    }

    pub fn code(&self) -> LocationErrorCode {
        match self {
            LocationError::PermissionDenied(_) => LocationErrorCode::PermissionDenied,
            LocationError::PositionUnavailable(_) => LocationErrorCode::PositionUnavailable,
            LocationError::Timeout(_) => LocationErrorCode::Timeout,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            LocationError::PermissionDenied(message)
            | LocationError::PositionUnavailable(message)
            | LocationError::Timeout(message) => message,
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        self.code() == LocationErrorCode::PermissionDenied
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    pub enable_high_accuracy: bool,
    #[serde(with = "millis")]
    pub timeout: Duration,
    #[serde(with = "millis")]
    pub maximum_age: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        WatchOptions {
            enable_high_accuracy: true,
            timeout: Duration::from_secs(30),
            maximum_age: Duration::from_secs(30),
        }
    }
}

// durations are plain milliseconds on the wire and in config files
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LocationEvent {
    Update(Position),
    Error(LocationError),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

pub type LocationCallback = Box<dyn Fn(LocationEvent) + Send + Sync>;

/// The platform facility delivering continuous location updates.
pub trait LocationService: Send + Sync {
    fn watch_position(&self, options: WatchOptions, callback: LocationCallback) -> Result<WatchId>;

    fn clear_watch(&self, id: WatchId);
}

struct Watch {
    options: WatchOptions,
    callback: Arc<LocationCallback>,
}

struct Watches {
    next_id: u64,
    items: HashMap<WatchId, Watch>,
}

/// A `LocationService` fed from the outside: whatever actually talks to the
/// GPS (a browser page, a mobile shell) pushes batches in here and they are
/// fanned out to every active watch.
pub struct PushLocationService {
    watches: Mutex<Watches>,
}

impl PushLocationService {
    pub fn new() -> Self {
        PushLocationService {
            watches: Mutex::new(Watches {
                next_id: 1,
                items: HashMap::new(),
            }),
        }
    }

    pub fn has_active_watch(&self) -> bool {
        !self.watches.lock().unwrap().items.is_empty()
    }

    pub fn wants_high_accuracy(&self) -> bool {
        self.watches
            .lock()
            .unwrap()
            .items
            .values()
            .any(|watch| watch.options.enable_high_accuracy)
    }

    // callbacks are invoked without holding the lock, so a callback may
    // clear or start watches.
    fn active_watches(&self) -> Vec<(WatchOptions, Arc<LocationCallback>)> {
        self.watches
            .lock()
            .unwrap()
            .items
            .values()
            .map(|watch| (watch.options, watch.callback.clone()))
            .collect()
    }

    pub fn on_location_update(&self, mut positions: Vec<Position>, received_timestamp_ms: i64) {
        let watches = self.active_watches();
        if watches.is_empty() {
            debug!("dropping {} positions, no active watch", positions.len());
            return;
        }

        // NOTE: platforms may deliver a batch out of order.
        positions.sort_by_key(|position| position.timestamp_ms);
        for position in positions {
            // timestamps come from the client, they can be anything
            let age_ms = received_timestamp_ms.saturating_sub(position.timestamp_ms);
            for (options, callback) in &watches {
                if age_ms > options.maximum_age.as_millis() as i64 {
                    debug!("ignoring stale position, age = {}ms", age_ms);
                    continue;
                }
                callback(LocationEvent::Update(position.clone()));
            }
        }
    }

    pub fn on_location_error(&self, error: LocationError) {
        info!("location error: {}", error);
        for (_, callback) in self.active_watches() {
            callback(LocationEvent::Error(error.clone()));
        }
    }
}

impl LocationService for PushLocationService {
    fn watch_position(&self, options: WatchOptions, callback: LocationCallback) -> Result<WatchId> {
        let mut watches = self.watches.lock().unwrap();
        let id = WatchId(watches.next_id);
        watches.next_id += 1;
        watches.items.insert(
            id,
            Watch {
                options,
                callback: Arc::new(callback),
            },
        );
        debug!("watch {:?} started with {:?}", id, options);
        Ok(id)
    }

    fn clear_watch(&self, id: WatchId) {
        if self.watches.lock().unwrap().items.remove(&id).is_none() {
            warn!("clearing unknown watch {:?}", id);
        }
    }
}
