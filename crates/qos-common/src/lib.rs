pub mod config;
pub mod models;
pub mod protocol;
pub mod quality;
