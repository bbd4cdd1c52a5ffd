//! Zone manager module
//!
//! Many independent buddy regions behind one allocate/free surface:
//! - Fast-path and slow-path pools selected by request order
//! - Most-free-first selection with deterministic tie breaking
//! - Identifier-based routing of frees

pub mod config;
pub mod zone_manager;
pub mod zone_order;

pub use config::{ZoneConfig, DEFAULT_INSTANCE_COUNT, DEFAULT_ZONE_MIN_ORDER};
pub use zone_manager::{Pool, ZoneAllocation, ZoneId, ZoneManager};
pub use zone_order::CapacityOrder;
