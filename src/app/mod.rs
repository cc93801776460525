pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod scaling;
pub mod settings;
pub mod shell;
pub mod state;
pub mod store;
pub mod tuner;
