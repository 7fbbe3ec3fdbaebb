//! Domain layer - Core types and port definitions
//!
//! This module defines the backend port the orchestrator drives and the
//! validated settings it consumes.

pub mod ports;
pub mod settings;

pub use ports::*;
pub use settings::*;
