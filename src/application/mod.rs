// Application layer - use cases and orchestration.
// The service owns every money-moving operation; clients never touch storage directly.

pub mod error;
pub mod service;

pub use error::*;
pub use service::*;
