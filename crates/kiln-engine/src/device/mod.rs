//! wgpu implementation of the driver and context traits.
//!
//! [`Gpu`] owns the instance, adapter, device and optional window surface.
//! [`WgpuDevice`] puts the handle-based driver API on top of it, rendering
//! into an offscreen target that `swap` copies onto the surface.

mod frame;
mod gpu;
mod init;
mod objects;
mod pipeline;
mod shader;
mod surface;
mod wgpu_device;

pub use gpu::Gpu;
pub use init::{GpuInit, LimitRequest};
pub use wgpu_device::WgpuDevice;

/// What happened after the surface failed to hand out a frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; the next frame may render.
    Reconfigured,
    /// Transient error; skip this frame.
    SkipFrame,
    /// Out of memory; rendering cannot continue.
    Fatal,
}
