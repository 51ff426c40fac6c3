//! Test Fixtures Module
//!
//! Shared helpers for the integration tests:
//! - An in-memory media room driven by the test
//! - Obstacle analyzers with scripted behavior

// Allow dead code in test fixtures - not every test binary uses every helper
#![allow(dead_code)]

pub mod analyzer_fixtures;
pub mod room_fixtures;

pub use analyzer_fixtures::*;
pub use room_fixtures::*;
