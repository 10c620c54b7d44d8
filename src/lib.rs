pub mod api;
pub mod config;
pub mod connections;
pub mod error;
pub mod logging;
pub mod monitoring;
pub mod server;
pub mod tts;
