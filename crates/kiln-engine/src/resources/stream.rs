use std::mem::size_of;

use crate::command::{AttributeType, MAX_STREAM_BUFFER_COUNT, MAX_VERTICES, Vertex, VertexTex3D};
use crate::driver::{BufferId, BufferKind, GpuDriver, LayoutId, VertexBinding};

/// A streaming vertex buffer with its layout.
#[derive(Debug, Default)]
pub struct StreamBuffer {
    pub buffer: Option<BufferId>,
    pub layout: Option<LayoutId>,
    pub last_index_buffer: Option<BufferId>,
}

impl StreamBuffer {
    fn create<D: GpuDriver + ?Sized>(
        driver: &mut D,
        stride: usize,
        preinit: bool,
        bindings: fn(BufferId) -> [VertexBinding; 3],
    ) -> Self {
        let size = if preinit { stride * MAX_VERTICES } else { 0 };
        let buffer = driver.create_buffer(BufferKind::Vertex, size, None);
        let layout = driver.create_vertex_layout();
        if let (Some(buffer), Some(layout)) = (buffer, layout) {
            driver.set_vertex_attributes(layout, &bindings(buffer));
        } else {
            log::warn!("driver could not create a stream buffer");
        }
        Self {
            buffer,
            layout,
            last_index_buffer: None,
        }
    }

    /// Attaches `index_buffer` to the layout unless it already is.
    pub fn bind_index_buffer<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        index_buffer: BufferId,
    ) {
        let Some(layout) = self.layout else {
            return;
        };
        if self.last_index_buffer != Some(index_buffer) {
            driver.set_index_buffer(layout, Some(index_buffer));
            self.last_index_buffer = Some(index_buffer);
        }
    }

    fn release<D: GpuDriver + ?Sized>(&mut self, driver: &mut D) {
        if let Some(layout) = self.layout.take() {
            driver.delete_vertex_layout(layout);
        }
        if let Some(buffer) = self.buffer.take() {
            driver.delete_buffer(buffer);
        }
        self.last_index_buffer = None;
    }
}

fn vertex_bindings(buffer: BufferId) -> [VertexBinding; 3] {
    let stride = size_of::<Vertex>() as u32;
    [
        VertexBinding {
            location: 0,
            buffer,
            kind: AttributeType::Float,
            components: 2,
            normalized: false,
            stride,
            offset: 0,
        },
        VertexBinding {
            location: 1,
            buffer,
            kind: AttributeType::Float,
            components: 2,
            normalized: false,
            stride,
            offset: 8,
        },
        VertexBinding {
            location: 2,
            buffer,
            kind: AttributeType::UnsignedByte,
            components: 4,
            normalized: true,
            stride,
            offset: 16,
        },
    ]
}

fn tex3d_bindings(buffer: BufferId) -> [VertexBinding; 3] {
    let stride = size_of::<VertexTex3D>() as u32;
    [
        VertexBinding {
            location: 0,
            buffer,
            kind: AttributeType::Float,
            components: 2,
            normalized: false,
            stride,
            offset: 0,
        },
        VertexBinding {
            location: 1,
            buffer,
            kind: AttributeType::Float,
            components: 3,
            normalized: false,
            stride,
            offset: 12,
        },
        VertexBinding {
            location: 2,
            buffer,
            kind: AttributeType::UnsignedByte,
            components: 4,
            normalized: true,
            stride,
            offset: 8,
        },
    ]
}

/// Round-robin pool of streaming buffers for per-frame vertex data.
///
/// Plain vertices rotate through `MAX_STREAM_BUFFER_COUNT` buffers so an
/// upload never waits on a draw still reading the previous one. Layered
/// vertices use a single dedicated buffer.
#[derive(Debug)]
pub struct StreamPool {
    buffers: Vec<StreamBuffer>,
    tex3d: StreamBuffer,
    current: usize,
    preinit: bool,
}

impl StreamPool {
    /// With `preinit` every buffer is sized for `MAX_VERTICES` up front and
    /// uploads overwrite in place; otherwise each upload reallocates.
    pub fn create<D: GpuDriver + ?Sized>(driver: &mut D, preinit: bool) -> Self {
        let buffers = (0..MAX_STREAM_BUFFER_COUNT)
            .map(|_| StreamBuffer::create(driver, size_of::<Vertex>(), preinit, vertex_bindings))
            .collect();
        let tex3d =
            StreamBuffer::create(driver, size_of::<VertexTex3D>(), preinit, tex3d_bindings);
        Self {
            buffers,
            tex3d,
            current: 0,
            preinit,
        }
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Uploads vertices into the current buffer (or the layered one) and
    /// returns it for drawing.
    pub fn upload<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        vertices: &[u8],
        tex3d: bool,
    ) -> &mut StreamBuffer {
        let preinit = self.preinit;
        let stream = if tex3d {
            &mut self.tex3d
        } else {
            &mut self.buffers[self.current]
        };
        if let Some(buffer) = stream.buffer {
            if preinit {
                driver.write_buffer(buffer, 0, vertices);
            } else {
                driver.reallocate_buffer(buffer, vertices.len(), Some(vertices));
            }
        }
        stream
    }

    /// Moves to the next plain buffer, wrapping after the last.
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.buffers.len().max(1);
    }

    pub fn reset_index_caches(&mut self) {
        for stream in &mut self.buffers {
            stream.last_index_buffer = None;
        }
        self.tex3d.last_index_buffer = None;
    }

    pub fn release<D: GpuDriver + ?Sized>(&mut self, driver: &mut D) {
        for stream in &mut self.buffers {
            stream.release(driver);
        }
        self.tex3d.release(driver);
    }
}
