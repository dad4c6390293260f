pub mod app;
pub mod cli;
pub mod config;
pub mod copier;
pub mod device;
pub mod error;
pub mod header;
pub mod session;
pub mod source;
pub mod voc;
