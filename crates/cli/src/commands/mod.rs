//! CLI Commands

pub mod config;
pub mod demo;

pub use config::ConfigCommand;
pub use demo::DemoCommand;
