//! Chippy library
//! Two-peer text messaging over a single Bluetooth Low Energy characteristic.

// Module declarations
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod logging;
pub mod state;
