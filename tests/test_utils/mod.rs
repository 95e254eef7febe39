#![allow(dead_code)]

use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use anyhow::Result;
use geovideo_core::location_service::{
    LocationCallback, LocationEvent, LocationService, WatchId, WatchOptions,
};
use geovideo_core::position::Position;
use geovideo_core::table_service::{TableRow, TableService};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use tokio::runtime::Runtime;

pub fn row(id: &str, name: &str, link: &str, position: &str) -> TableRow {
    serde_json::from_value(json!({
        "id": id,
        "createdTime": "2021-03-01T10:00:00.000Z",
        "fields": {"Name": name, "Link": link, "Position": position},
    }))
    .unwrap()
}

pub fn position(latitude: f64, longitude: f64, timestamp_ms: i64) -> Position {
    Position {
        latitude,
        longitude,
        accuracy: 12.0,
        altitude: Some(150.0),
        altitude_accuracy: None,
        heading: None,
        speed: None,
        timestamp_ms,
    }
}

/// Serves fixed pages; `fail_at` makes that page (0-based) error out.
pub struct FakeTableService {
    pub pages: Vec<Vec<TableRow>>,
    pub fail_at: Option<usize>,
    pub requested_tables: Mutex<Vec<String>>,
}

impl FakeTableService {
    pub fn new(pages: Vec<Vec<TableRow>>) -> Self {
        FakeTableService {
            pages,
            fail_at: None,
            requested_tables: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_at(pages: Vec<Vec<TableRow>>, fail_at: usize) -> Self {
        FakeTableService {
            fail_at: Some(fail_at),
            ..Self::new(pages)
        }
    }
}

impl TableService for FakeTableService {
    fn each_page(&self, table: &str, on_page: &mut dyn FnMut(Vec<TableRow>)) -> Result<()> {
        self.requested_tables
            .lock()
            .unwrap()
            .push(table.to_string());
        for (i, page) in self.pages.iter().enumerate() {
            if self.fail_at == Some(i) {
                anyhow::bail!("page {} unavailable", i);
            }
            on_page(page.clone());
        }
        Ok(())
    }
}

/// Hands callbacks out to the test. Cleared watches are remembered so a test
/// can keep poking at a callback the platform should have dropped.
pub struct ManualLocationService {
    next_id: Mutex<u64>,
    callbacks: Mutex<HashMap<WatchId, (WatchOptions, Arc<LocationCallback>)>>,
    active: Mutex<Vec<WatchId>>,
}

impl ManualLocationService {
    pub fn new() -> Self {
        ManualLocationService {
            next_id: Mutex::new(1),
            callbacks: Mutex::new(HashMap::new()),
            active: Mutex::new(Vec::new()),
        }
    }

    pub fn active_watches(&self) -> Vec<WatchId> {
        self.active.lock().unwrap().clone()
    }

    pub fn options(&self, id: WatchId) -> WatchOptions {
        self.callbacks.lock().unwrap()[&id].0
    }

    /// Delivers to `id` whether or not it was cleared.
    pub fn emit(&self, id: WatchId, event: LocationEvent) {
        let callback = self.callbacks.lock().unwrap()[&id].1.clone();
        callback(event);
    }

    pub fn emit_to_active(&self, event: LocationEvent) {
        for id in self.active_watches() {
            self.emit(id, event.clone());
        }
    }
}

impl LocationService for ManualLocationService {
    fn watch_position(&self, options: WatchOptions, callback: LocationCallback) -> Result<WatchId> {
        let mut next_id = self.next_id.lock().unwrap();
        let id = WatchId(*next_id);
        *next_id += 1;
        self.callbacks
            .lock()
            .unwrap()
            .insert(id, (options, Arc::new(callback)));
        self.active.lock().unwrap().push(id);
        Ok(id)
    }

    fn clear_watch(&self, id: WatchId) {
        self.active.lock().unwrap().retain(|active| *active != id);
    }
}

pub const FAKE_API_KEY: &str = "keyFake";

struct FakeAirtableState {
    pages: Vec<Vec<Value>>,
    fail_at: Option<usize>,
    requests: Mutex<Vec<String>>,
}

// Pages are addressed by offset tokens "page-<n>".
async fn list_records(
    path: web::Path<(String, String)>,
    query: web::Query<HashMap<String, String>>,
    req: HttpRequest,
    data: web::Data<FakeAirtableState>,
) -> HttpResponse {
    data.requests.lock().unwrap().push(req.uri().to_string());
    let authorized = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .map(|h| h == format!("Bearer {}", FAKE_API_KEY))
        .unwrap_or(false);
    if !authorized {
        return HttpResponse::Unauthorized().finish();
    }
    let (_base, table) = path.into_inner();
    if table != "Videos" {
        return HttpResponse::NotFound().finish();
    }
    let index = match query.get("offset") {
        None => 0,
        Some(offset) => match offset.strip_prefix("page-").and_then(|i| i.parse().ok()) {
            Some(i) => i,
            None => return HttpResponse::UnprocessableEntity().finish(),
        },
    };
    if data.fail_at == Some(index) {
        return HttpResponse::InternalServerError().finish();
    }
    let records = data.pages.get(index).cloned().unwrap_or_default();
    let mut body = json!({ "records": records });
    if index + 1 < data.pages.len() {
        body["offset"] = json!(format!("page-{}", index + 1));
    }
    HttpResponse::Ok().json(body)
}

/// A tiny stand-in for the Airtable REST API, running on its own thread.
pub struct FakeAirtable {
    pub url: String,
    state: web::Data<FakeAirtableState>,
    server_handle: ServerHandle,
    handle: Option<thread::JoinHandle<()>>,
}

impl FakeAirtable {
    pub fn start(pages: Vec<Vec<Value>>, fail_at: Option<usize>) -> Self {
        let state = web::Data::new(FakeAirtableState {
            pages,
            fail_at,
            requests: Mutex::new(Vec::new()),
        });
        let app_state = state.clone();
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let runtime = Runtime::new().expect("Failed to create Tokio runtime");
            runtime.block_on(async move {
                let server = HttpServer::new(move || {
                    App::new()
                        .app_data(app_state.clone())
                        .route("/v0/{base}/{table}", web::get().to(list_records))
                })
                .workers(1)
                .shutdown_timeout(1)
                .bind(("127.0.0.1", 0))
                .expect("Failed to bind fake airtable");
                let port = server.addrs()[0].port();
                let server = server.run();
                tx.send((port, server.handle())).unwrap();
                server.await.unwrap();
            });
        });
        let (port, server_handle) = rx.recv().unwrap();
        FakeAirtable {
            url: format!("http://127.0.0.1:{}", port),
            state,
            server_handle,
            handle: Some(handle),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl Drop for FakeAirtable {
    fn drop(&mut self) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(self.server_handle.stop(true));
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
    }
}
