//! Output devices that need more than the core's in-process backends.

mod stream;
mod wave;

pub use stream::{CpalBackend, CpalStream};
pub use wave::WaveBackend;
