pub mod registry;
pub mod service;

pub use registry::{normalize_code, RoomRegistry, SharedRoom};
pub use service::{RoomService, Timings};
