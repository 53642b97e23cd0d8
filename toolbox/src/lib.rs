pub mod charts;
pub mod dimension;
mod error;
pub mod registry;
mod state;
pub mod tools;

#[cfg(test)]
mod test_utils;

pub use charts::Payload;
pub use dimension::{DEFAULT_SEARCH_LIMIT, Dimension, DimensionValue};
pub use error::ToolError;
pub use registry::{Manifest, Toolbox};
pub use state::State;
