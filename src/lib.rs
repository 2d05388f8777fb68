//! ts3check library - TeamSpeak 3 ServerQuery monitoring plugin
//!
//! This module exports internal components for integration testing.

pub mod config;
pub mod plugin;
pub mod query;
pub mod redact;
pub mod report;
pub mod session;
