//! Background Tasks Module
//!
//! Contains background tasks that run periodically while an adapter is alive.
//!
//! # Tasks
//! - GC Sweep: Removes expired cache entries at configured intervals

mod gc;

pub use gc::{spawn_gc_task, GcState, Sweep, SweepReport};
