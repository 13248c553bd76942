//! Audio output resources.
//!
//! An [`AudioBackend`] acquires an output and hands the freshly built
//! [`RenderNode`] to it; from then on the node belongs to the output's render
//! callback. The resulting [`AudioOutput`] is a control-side handle that can
//! resume, suspend and close the stream, and may be moved to the thread that
//! fires the deferred suspend.

#[cfg(not(target_arch = "wasm32"))]
pub mod cpal_output;
pub mod offline;

#[cfg(not(target_arch = "wasm32"))]
pub use cpal_output::{CpalBackend, CpalOutput};
pub use offline::{OfflineBackend, OfflineOutput};

use crate::error::Result;
use crate::render::RenderNode;

pub trait AudioBackend {
    type Output: AudioOutput + Send + 'static;

    /// Acquire the output. `build` receives the output's sample rate and
    /// returns the node the render callback will own. The stream is left
    /// suspended.
    fn open<F>(&self, build: F) -> Result<Self::Output>
    where
        F: FnOnce(u32) -> RenderNode + Send + 'static;
}

pub trait AudioOutput {
    fn sample_rate(&self) -> u32;

    /// Start or restart the render callback.
    fn resume(&mut self) -> Result<()>;

    /// Stop invoking the render callback. The node keeps its state.
    fn suspend(&mut self);

    /// Release the stream and the node. Idempotent.
    fn close(&mut self);
}
