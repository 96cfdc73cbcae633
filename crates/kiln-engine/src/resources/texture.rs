use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::command::WrapMode;
use crate::driver::{GpuDriver, SamplerId, TextureBinding, TextureId, TextureTarget};

/// One row of the texture table.
#[derive(Debug, Default)]
pub struct TextureSlot {
    pub tex: Option<TextureId>,
    pub sampler: Option<SamplerId>,
    pub layered: Option<TextureId>,
    pub layered_sampler: Option<SamplerId>,
    pub layered_target: Option<TextureTarget>,
    pub width: u32,
    pub height: u32,
    /// Times the image was halved to fit.
    pub rescale_count: u32,
    /// Bytes charged to the memory counter.
    pub mem_size: usize,
    pub last_wrap: WrapMode,
    /// pot/original ratios when the image was resized to a power of two.
    pub resize_ratio: Option<(f32, f32)>,
}

impl TextureSlot {
    pub fn is_live(&self) -> bool {
        self.tex.is_some() || self.layered.is_some()
    }

    pub fn binding_2d(&self) -> Option<TextureBinding> {
        Some(TextureBinding {
            texture: self.tex?,
            sampler: self.sampler,
            target: TextureTarget::D2,
        })
    }

    pub fn binding_layered(&self) -> Option<TextureBinding> {
        Some(TextureBinding {
            texture: self.layered?,
            sampler: self.layered_sampler,
            target: self.layered_target?,
        })
    }

    /// Releases every handle and resets the slot. Returns the freed byte count.
    pub fn release<D: GpuDriver + ?Sized>(&mut self, driver: &mut D) -> usize {
        if let Some(tex) = self.tex.take() {
            driver.delete_texture(tex);
        }
        if let Some(tex) = self.layered.take() {
            driver.delete_texture(tex);
        }
        if let Some(sampler) = self.sampler.take() {
            driver.delete_sampler(sampler);
        }
        if let Some(sampler) = self.layered_sampler.take() {
            driver.delete_sampler(sampler);
        }
        self.layered_target = None;
        self.last_wrap = WrapMode::Repeat;
        std::mem::take(&mut self.mem_size)
    }
}

/// Texture memory counter shared with the producer.
///
/// Written only by the render thread; relaxed ordering is enough because the
/// producer reads it as a statistic.
#[derive(Debug, Clone, Default)]
pub struct TextureMemory(Arc<AtomicUsize>);

impl TextureMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    pub fn add(&self, bytes: usize) {
        self.0.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }

    pub fn sub(&self, bytes: usize) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(bytes))
            });
    }
}
