//! Utility helpers: generational allocator, pass logging/timing, and math extensions.

pub mod allocator;
pub mod logging;
pub mod math;

pub use allocator::{Arena, GenerationalId, Handle, NodeId, ObjectId};
pub use logging::{PassProfile, ScopedTimer};
