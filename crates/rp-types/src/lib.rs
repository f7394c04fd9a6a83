pub mod market;
pub mod portfolio;
pub mod sinks;
pub mod stats;
pub mod errors;

pub use market::*;
pub use portfolio::*;
pub use sinks::*;
pub use errors::*;
