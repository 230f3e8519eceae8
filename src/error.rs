use thiserror::Error;

use crate::drawable::PixelFormat;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DriverError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("the drawable is not a direct-mapped bitmap")]
    NotDirect,

    #[error("only 16 bit RGB16PC drawables are supported, got {depth} bit {format:?}")]
    UnsupportedFormat {
        depth: u32,
        format: PixelFormat,
    },

    #[error("out of memory: could not allocate the {0}")]
    OutOfMemory(&'static str),

    #[error("the drawable's native memory could not be locked")]
    ResourceUnavailable,
}

impl DriverError {
    /// Both direct-mapping and depth/layout rejections are format failures.
    pub fn is_unsupported_format(&self) -> bool {
        matches!(self, DriverError::NotDirect | DriverError::UnsupportedFormat { .. })
    }
}
