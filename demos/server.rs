use geovideo_core::config::Config;
use geovideo_core::location_service::PushLocationService;
use geovideo_core::logs;
use geovideo_core::server::ViewServer;
use geovideo_core::session::Session;
use geovideo_core::table_service::AirtableClient;

use std::path::Path;
use std::sync::{mpsc, Arc};

// Usage: `cargo run --example server -- [config.toml]`
// `GEOVIDEO_*` environment variables override the file, e.g.
//    GEOVIDEO_API_KEY=key... GEOVIDEO_BASE_ID=app... cargo run --example server
pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(Path::new(&path))?,
        None => Config::default(),
    }
    .apply_env()?;

    match &config.log_dir {
        Some(log_dir) => logs::init(log_dir)?,
        None => {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
                .format_timestamp(None)
                .format_module_path(false)
                .init();
        }
    }
    config.validate()?;

    let locations = Arc::new(PushLocationService::new());
    let table_service = Arc::new(AirtableClient::new(&config.table)?);
    let session = Arc::new(Session::new(
        config.clone(),
        locations.clone(),
        table_service,
    ));

    // an empty library is still a usable page
    if let Err(e) = session.load_catalog() {
        eprintln!("could not load videos: {:#}", e);
    }
    println!("{} videos in the library", session.records().len());

    let mut server = ViewServer::new(
        &config.server.host,
        config.server.port,
        session.clone(),
        locations,
    );
    server.start()?;

    println!("================================================");
    println!("[Geolocalized videos]:   {}", server.url());
    println!("================================================");
    println!("Press Ctrl+C to stop.");

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    rx.recv()?;

    server.stop();
    Ok(())
}
