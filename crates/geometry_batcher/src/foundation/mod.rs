//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the batcher:
//! - Math types for vertex data
//! - Index pools for recyclable identifiers
//! - Lock helpers
//! - Logging utilities

pub mod math;
pub mod collections;
pub mod sync;
pub mod logging;
