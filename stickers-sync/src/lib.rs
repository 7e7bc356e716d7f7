pub mod config;
pub mod saved;
