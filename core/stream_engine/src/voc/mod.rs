//! Creative Voice File playback.

pub mod block;
mod interpreter;

pub use interpreter::play_voc;
