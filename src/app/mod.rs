pub mod adb;
pub mod config;
pub mod error;
pub mod jank;
pub mod logging;
pub mod models;
pub mod tile;
