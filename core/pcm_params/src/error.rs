use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("wrong extended format '{0}'")]
    UnknownFormat(String),
    #[error("value {0} for channels is invalid")]
    InvalidChannels(u32),
    #[error("bad speed value {0}")]
    InvalidRate(u32),
    #[error("unknown file type '{0}'")]
    UnknownFileType(String),
}
