//! # Accord CLI
//!
//! The `accord` binary: a demo scenario driving the full stack with the
//! scripted oracle, and a configuration inspector.

pub mod commands;
