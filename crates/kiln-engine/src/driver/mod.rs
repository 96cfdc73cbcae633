//! The GPU boundary.
//!
//! Tiers talk to the GPU only through [`GpuDriver`] and to the window system
//! only through [`GpuContext`]. Both are owned by the render thread.

mod recording;
mod traits;
mod types;

pub use recording::{BufferRecord, DrawKind, DrawRecord, LayoutRecord, RecordingDriver, TextureRecord};
pub use traits::{GpuContext, GpuDriver, RenderDevice};
pub use types::*;
