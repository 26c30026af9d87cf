pub mod error;
pub mod path;

pub use error::{Error, Result};
pub use path::LogicalPath;
