//! Producer/render-thread handoff.
//!
//! [`ThreadedBackend`] owns the render thread and the single in-flight
//! buffer slot; [`Session`] is the producer's view of a running engine.

mod session;
mod threaded;

pub use session::{Session, StartFailure};
pub use threaded::{BufferProcessor, RenderThreadLost, ThreadedBackend};
