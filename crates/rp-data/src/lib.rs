pub mod loaders;
pub mod storage;

pub use loaders::*;
pub use storage::*;
