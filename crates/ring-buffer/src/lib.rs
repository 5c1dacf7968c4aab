//! Sliding Window Buffer
//!
//! Provides fixed-depth circular storage of past sample vectors, used by
//! windowed features to look up the sample that is about to leave the window.

mod buffer;
mod error;

pub use buffer::SampleBuffer;
pub use error::BufferError;
