pub mod error;
pub mod format;
pub mod hw;
pub mod limit;
pub mod timing;

pub use error::ParseError;
pub use format::SampleFormat;
pub use hw::{AccessMode, HardwareConfig};
