pub mod config;
pub mod db;
pub mod logging;
pub mod services;
pub mod srs;
pub mod state;
pub mod workers;
