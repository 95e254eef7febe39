use serde::Serialize;
use std::fmt::Write;

use crate::geo_utils;
use crate::position::Position;
use crate::position_watcher::WatcherState;
use crate::video_catalog::VideoRecord;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PositionStatus {
    NotAllowed,
    Pending,
    Known { position: Position },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VideoItem {
    pub name: String,
    pub url: String,
    // both are only set once we know where the user is
    pub distance_m: Option<u64>,
    pub map_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ViewModel {
    pub error_message: Option<String>,
    pub position: PositionStatus,
    pub nearest: Option<VideoItem>,
    pub videos: Vec<VideoItem>,
    pub shared_view_url: Option<String>,
}

pub fn nearest_video<'a>(position: &Position, records: &'a [VideoRecord]) -> Option<&'a VideoRecord> {
    let index = geo_utils::find_nearest(
        &position.coordinates(),
        records.iter().map(|record| &record.coordinates),
    )?;
    records.get(index)
}

fn video_item(record: &VideoRecord, position: Option<&Position>) -> VideoItem {
    VideoItem {
        name: record.name.clone(),
        url: record.url.clone(),
        distance_m: position
            .map(|position| geo_utils::get_distance(&position.coordinates(), &record.coordinates)),
        map_url: position.map(|_| geo_utils::map_search_url(&record.coordinates)),
    }
}

/// After a denial the last known position still drives the per-item
/// distances of the library, but the position section and the nearest video
/// only show while permission is granted.
pub fn build_view(
    state: &WatcherState,
    records: &[VideoRecord],
    shared_view_url: Option<&str>,
) -> ViewModel {
    let position = state.position.as_ref();
    let status = match (state.allowed_geolocation, position) {
        (false, _) => PositionStatus::NotAllowed,
        (true, None) => PositionStatus::Pending,
        (true, Some(position)) => PositionStatus::Known {
            position: position.clone(),
        },
    };
    let nearest = match &status {
        PositionStatus::Known { position } => {
            nearest_video(position, records).map(|record| video_item(record, Some(position)))
        }
        _ => None,
    };
    ViewModel {
        error_message: state.error.as_ref().map(|e| e.message().to_string()),
        position: status,
        nearest,
        videos: records
            .iter()
            .map(|record| video_item(record, position))
            .collect(),
        shared_view_url: shared_view_url.map(str::to_string),
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn render_video_item(html: &mut String, item: &VideoItem) {
    let _ = write!(
        html,
        r#"<span><a href="{}" target="_blank"><b>{}</b></a>"#,
        escape(&item.url),
        escape(&item.name)
    );
    if let (Some(distance), Some(map_url)) = (item.distance_m, &item.map_url) {
        let _ = write!(
            html,
            r#" <span>at {}m (open in <a href="{}" target="_blank">Maps</a>)</span>"#,
            distance,
            escape(map_url)
        );
    }
    html.push_str("</span>");
}

pub fn render_html(view: &ViewModel) -> String {
    let mut html = String::new();
    html.push_str(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>Geolocalized videos</title>\n\
         <script src=\"/geolocate.js\" defer></script>\n</head>\n<body>\n",
    );
    html.push_str("<h1>Geolocalized videos</h1>\n");
    if let Some(message) = &view.error_message {
        let _ = writeln!(html, r#"<p class="error">{}</p>"#, escape(message));
    }

    html.push_str("<p>This is a prototype for discovering videos based on your geolocation.");
    if let Some(url) = &view.shared_view_url {
        let _ = write!(
            html,
            r#" Listed videos can be managed in an Airtable database (here is a <a target="_blank" href="{}">read-only</a> view of the one used here)."#,
            escape(url)
        );
    }
    html.push_str("</p>\n");

    html.push_str("<h2>Your Position</h2>\n");
    match &view.position {
        PositionStatus::NotAllowed => {
            html.push_str(
                "<p>You have not allowed access to your geolocation.</p>\n\
                 <form method=\"post\" action=\"/geolocate\" id=\"geolocate\">\
                 <button type=\"submit\">Geolocalize me!</button></form>\n",
            );
        }
        PositionStatus::Pending => {
            html.push_str("<p>Your position is not available yet.</p>\n");
        }
        PositionStatus::Known { position } => {
            if let Some(nearest) = &view.nearest {
                html.push_str("<p>The nearest video is ");
                render_video_item(&mut html, nearest);
                html.push_str("</p>\n");
            }
            let _ = writeln!(
                html,
                "<table>\n<tr><td>Latitude</td><td>{}</td></tr>\n\
                 <tr><td>Longitude</td><td>{}</td></tr>\n\
                 <tr><td>Accuracy (m)</td><td>{}</td></tr>\n</table>",
                position.latitude, position.longitude, position.accuracy
            );
            html.push_str(
                "<p>You may get better accuracy on mobile by disconnecting your WiFi \
                 (which could force the switch to using GPS).</p>\n",
            );
        }
    }

    html.push_str("<h2>Video library</h2>\n<ul>\n");
    for item in &view.videos {
        html.push_str("<li>");
        render_video_item(&mut html, item);
        html.push_str("</li>\n");
    }
    html.push_str("</ul>\n</body>\n</html>\n");
    html
}
