pub mod mocks;
pub mod setup;

pub use mocks::MockConnectionManager;
pub use setup::{TestSetup, TestSetupBuilder, ROOM};
