pub mod adb;
pub mod cli;
pub mod commander;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod paths;
pub mod state;
