#![allow(clippy::new_without_default)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

pub mod config;
pub mod geo_utils;
pub mod location_service;
pub mod logs;
pub mod position;
pub mod position_watcher;
pub mod server;
pub mod session;
pub mod table_service;
pub mod video_catalog;
pub mod view;
