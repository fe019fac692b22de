//! Command handlers for Reliq CLI
//!
//! This module contains the handlers for queue statistics, task operations
//! and sweeping.

pub mod stats;
pub mod sweep;
pub mod task;
