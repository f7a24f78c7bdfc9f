//! Background Tasks Module
//!
//! # Tasks
//! - TTL Sweep: Purges expired cache entries at a configured interval

mod sweep;

pub use sweep::spawn_sweep_task;
