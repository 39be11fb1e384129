//! Fishing trip tracker core: GPS fix fan-out, buoy weather polling and
//! SQLite trip logging.

pub mod broadcaster;
pub mod config;
pub mod database;
pub mod errors;
pub mod geo;
pub mod location;
pub mod models;
pub mod recorder;
pub mod weather;
