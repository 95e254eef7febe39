use anyhow::Result;
use serde::Serialize;
use std::sync::Mutex;

use crate::position::Coordinates;
use crate::table_service::{TableRow, TableService};

pub const NAME_FIELD: &str = "Name";
pub const LINK_FIELD: &str = "Link";
pub const POSITION_FIELD: &str = "Position";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VideoRecord {
    pub name: String,
    pub url: String,
    pub coordinates: Coordinates,
}

/// Parses `"<lat>,<lon>"`. Both parts must be finite numbers, anything after
/// a second comma is ignored.
pub fn parse_coordinates(text: &str) -> Option<Coordinates> {
    let parse = |s: &str| s.trim().parse::<f64>().ok().filter(|x| x.is_finite());
    let mut parts = text.split(',');
    let latitude = parse(parts.next()?)?;
    let longitude = parse(parts.next()?)?;
    Some(Coordinates::new(latitude, longitude))
}

/// `None` means the row is not usable and should be dropped.
pub fn parse_video_record(row: &TableRow) -> Option<VideoRecord> {
    let name = row.get_str(NAME_FIELD).filter(|s| !s.is_empty())?;
    let url = row.get_str(LINK_FIELD).filter(|s| !s.is_empty())?;
    let coordinates = parse_coordinates(row.get_str(POSITION_FIELD).unwrap_or_default())?;
    Some(VideoRecord {
        name: name.to_string(),
        url: url.to_string(),
        coordinates,
    })
}

/// Reads every page of `table` and keeps the valid rows, in table order.
pub fn load_video_records(service: &dyn TableService, table: &str) -> Result<Vec<VideoRecord>> {
    let mut records = Vec::new();
    let mut dropped = 0;
    service.each_page(table, &mut |rows| {
        for row in rows {
            match parse_video_record(&row) {
                Some(record) => records.push(record),
                None => {
                    debug!("dropping malformed row {}", row.id);
                    dropped += 1;
                }
            }
        }
    })?;
    info!(
        "loaded {} videos from `{}`, dropped {} rows",
        records.len(),
        table,
        dropped
    );
    Ok(records)
}

/// The in-memory list of videos. Always replaced as a whole.
pub struct VideoCatalog {
    records: Mutex<Vec<VideoRecord>>,
}

impl VideoCatalog {
    pub fn new() -> Self {
        VideoCatalog {
            records: Mutex::new(Vec::new()),
        }
    }

    /// A failed fetch leaves the catalog empty, even if earlier pages made
    /// it through.
    pub fn reload(&self, service: &dyn TableService, table: &str) -> Result<()> {
        let result = load_video_records(service, table);
        let mut records = self.records.lock().unwrap();
        match result {
            Ok(loaded) => {
                *records = loaded;
                Ok(())
            }
            Err(e) => {
                warn!("failed to load video catalog: {:?}", e);
                records.clear();
                Err(e)
            }
        }
    }

    pub fn records(&self) -> Vec<VideoRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
