use crate::driver::{BufferId, BufferKind, GpuDriver};

const INDICES_PER_QUAD: usize = 6;

/// Triangle-list indices for `quads` quads starting at quad `first_quad`.
///
/// Quad `q` covers vertices `4q..4q+4` and yields `4q, 4q+1, 4q+2, 4q, 4q+2, 4q+3`.
pub fn quad_indices(first_quad: usize, quads: usize) -> Vec<u32> {
    let mut out = Vec::with_capacity(quads * INDICES_PER_QUAD);
    for q in first_quad..first_quad + quads {
        let base = (q * 4) as u32;
        out.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    out
}

/// The shared quad index buffer used by every indexed container draw.
#[derive(Debug, Default)]
pub struct QuadIndexBuffer {
    pub handle: Option<BufferId>,
    /// Number of indices the buffer holds.
    pub index_count: usize,
}

impl QuadIndexBuffer {
    pub fn create<D: GpuDriver + ?Sized>(driver: &mut D, index_count: usize) -> Self {
        let quads = index_count.div_ceil(INDICES_PER_QUAD);
        let indices = quad_indices(0, quads);
        let handle = driver.create_buffer(
            BufferKind::Index,
            indices.len() * 4,
            Some(bytemuck::cast_slice(&indices)),
        );
        if handle.is_none() {
            log::warn!("driver could not allocate quad index buffer");
        }
        Self {
            handle,
            index_count: indices.len(),
        }
    }

    /// Grows the buffer to hold at least `required` indices.
    ///
    /// Existing contents are copied into the new buffer before the pattern is
    /// extended. Returns true when the handle changed, in which case every
    /// cached index-buffer binding is stale.
    pub fn append_indices<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, required: usize) -> bool {
        if required <= self.index_count {
            return false;
        }
        let new_count = required.div_ceil(INDICES_PER_QUAD) * INDICES_PER_QUAD;
        let Some(new_handle) = driver.create_buffer(BufferKind::Index, new_count * 4, None) else {
            log::warn!("driver could not grow quad index buffer to {new_count} indices");
            return false;
        };

        if let Some(old) = self.handle.take() {
            driver.copy_buffer(old, new_handle, 0, 0, self.index_count * 4);
            driver.delete_buffer(old);
        }
        let first_quad = self.index_count / INDICES_PER_QUAD;
        let tail = quad_indices(first_quad, new_count / INDICES_PER_QUAD - first_quad);
        driver.write_buffer(
            new_handle,
            self.index_count * 4,
            bytemuck::cast_slice(&tail),
        );

        log::debug!(
            "quad index buffer grown from {} to {new_count} indices",
            self.index_count
        );
        self.handle = Some(new_handle);
        self.index_count = new_count;
        true
    }

    pub fn release<D: GpuDriver + ?Sized>(&mut self, driver: &mut D) {
        if let Some(handle) = self.handle.take() {
            driver.delete_buffer(handle);
        }
        self.index_count = 0;
    }
}
