use actix_web::dev::{Service, ServerHandle};
use actix_web::{http::header, web, App, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use std::sync::{mpsc, Arc};
use std::thread;
use tokio::runtime::Runtime;

use crate::location_service::{LocationError, LocationErrorCode, PushLocationService};
use crate::position::Position;
use crate::session::Session;
use crate::view;

const GEOLOCATE_JS: &str = include_str!("../static/geolocate.js");

struct AppState {
    session: Arc<Session>,
    locations: Arc<PushLocationService>,
}

#[derive(Deserialize, Debug)]
pub struct LocationUpdate {
    pub positions: Vec<Position>,
}

#[derive(Deserialize, Debug)]
pub struct LocationErrorReport {
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

async fn index(data: web::Data<AppState>) -> HttpResponse {
    let html = view::render_html(&data.session.view());
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html)
}

async fn serve_view_json(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.session.view())
}

// lets the page know whether it should (re)start `watchPosition` and how
async fn serve_watch(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "watching": data.session.is_watching(),
        "options": data.session.config().watch,
    }))
}

async fn geolocate(data: web::Data<AppState>) -> HttpResponse {
    match data.session.request_geolocation() {
        Ok(()) => HttpResponse::SeeOther()
            .insert_header((header::LOCATION, "/"))
            .finish(),
        Err(e) => {
            error!("failed to request geolocation: {:?}", e);
            HttpResponse::InternalServerError().body(e.to_string())
        }
    }
}

async fn push_location(
    update: web::Json<LocationUpdate>,
    data: web::Data<AppState>,
) -> HttpResponse {
    let received_timestamp_ms = Utc::now().timestamp_millis();
    data.locations
        .on_location_update(update.into_inner().positions, received_timestamp_ms);
    HttpResponse::NoContent().finish()
}

async fn push_location_error(
    report: web::Json<LocationErrorReport>,
    data: web::Data<AppState>,
) -> HttpResponse {
    let report = report.into_inner();
    match LocationErrorCode::of_int(report.code) {
        Ok(code) => {
            data.locations
                .on_location_error(LocationError::new(code, report.message));
            HttpResponse::NoContent().finish()
        }
        Err(e) => HttpResponse::BadRequest().body(e.to_string()),
    }
}

async fn serve_geolocate_js() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/javascript")
        .body(GEOLOCATE_JS)
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/view.json", web::get().to(serve_view_json))
        .route("/watch.json", web::get().to(serve_watch))
        .route("/geolocate", web::post().to(geolocate))
        .route("/location", web::post().to(push_location))
        .route("/location/error", web::post().to(push_location_error))
        .route("/geolocate.js", web::get().to(serve_geolocate_js));
}

/// Serves the view to a browser, which in turn feeds its geolocation back
/// through `PushLocationService`.
pub struct ViewServer {
    host: String,
    port: u16,
    session: Arc<Session>,
    locations: Arc<PushLocationService>,
    server_handle: Option<ServerHandle>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ViewServer {
    pub fn new(
        host: &str,
        port: u16,
        session: Arc<Session>,
        locations: Arc<PushLocationService>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            session,
            locations,
            server_handle: None,
            handle: None,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    // Start the server in a separate thread
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            bail!("view server already started");
        }
        let host = self.host.clone();
        let port = self.port;
        let app_state = web::Data::new(AppState {
            session: self.session.clone(),
            locations: self.locations.clone(),
        });

        // reports the bound port back, or why binding failed
        let (tx, rx) = mpsc::channel::<std::io::Result<(u16, ServerHandle)>>();

        let handle = thread::spawn(move || {
            let runtime = match Runtime::new() {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            };
            runtime.block_on(async move {
                let server = HttpServer::new(move || {
                    App::new()
                        .app_data(app_state.clone())
                        .wrap_fn(|req, srv| {
                            debug!("Incoming request: {} {}", req.method(), req.uri());
                            srv.call(req)
                        })
                        .configure(routes)
                })
                .workers(2)
                .shutdown_timeout(1)
                .bind((host.as_str(), port));
                let server = match server {
                    Ok(server) => server,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return;
                    }
                };

                // port 0 means the OS picked one
                let actual_port = server
                    .addrs()
                    .first()
                    .map(|addr| addr.port())
                    .unwrap_or(port);
                let server = server.run();
                let _ = tx.send(Ok((actual_port, server.handle())));

                info!("view server bound to {}:{}", host, actual_port);
                if let Err(e) = server.await {
                    error!("view server failed: {}", e);
                }
            });
        });

        let (port, server_handle) = rx
            .recv()
            .context("view server thread exited before binding")?
            .with_context(|| format!("failed to bind {}:{}", self.host, self.port))?;
        self.port = port;
        self.server_handle = Some(server_handle);
        self.handle = Some(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(server_handle) = self.server_handle.take() {
            match tokio::runtime::Builder::new_current_thread().build() {
                Ok(runtime) => runtime.block_on(server_handle.stop(true)),
                Err(e) => warn!("failed to stop view server: {}", e),
            }
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("view server thread panicked");
            }
        }
    }
}

impl Drop for ViewServer {
    fn drop(&mut self) {
        self.stop();
    }
}
