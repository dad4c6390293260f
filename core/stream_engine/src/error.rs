use std::io;

use pcm_params::ParseError;
use thiserror::Error;

use crate::device::DeviceError;

pub type Result<T> = std::result::Result<T, StreamError>;

/// Every error here is fatal for the run. Underruns only show up as
/// [`StreamError::Underrun`] once recovery itself has failed.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Bad magic, unsupported coding, checksum mismatch.
    #[error("{0}")]
    Format(String),

    /// No acceptable device configuration near the request.
    #[error("unable to configure device: {0}")]
    Config(String),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("underrun recovery failed: {0}")]
    Underrun(String),

    /// Malformed or unsupported voice-file block stream.
    #[error("{0}")]
    Protocol(String),

    #[error("{op} error: {source}")]
    Device {
        op: &'static str,
        #[source]
        source: DeviceError,
    },
}

impl StreamError {
    pub fn format<S: Into<String>>(msg: S) -> Self {
        Self::Format(msg.into())
    }

    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn device(op: &'static str, source: DeviceError) -> Self {
        Self::Device { op, source }
    }
}

impl From<ParseError> for StreamError {
    fn from(err: ParseError) -> Self {
        Self::Config(err.to_string())
    }
}
