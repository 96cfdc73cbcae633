//! CPU expansion of container draws for drivers without a usable shader path.
//!
//! Indexed container draws are turned back into quads read from the buffer
//! shadow copies and streamed from client memory.

use crate::command::{RenderBorderTile, RenderBorderTileLine, TileDraw, VertexTex3D};
use crate::driver::{ClientFormat, GpuDriver, Topology};
use crate::resources::{BufferTable, ContainerEntry};

const INDEX_SIZE: usize = 4;
const INDICES_PER_QUAD: usize = 6;

/// First vertex of the quad an index byte offset points at.
fn first_vertex(index_offset: usize) -> usize {
    index_offset / (INDICES_PER_QUAD * INDEX_SIZE) * 4
}

pub(crate) fn color_bytes(color: [f32; 4]) -> [u8; 4] {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Vertices streamed from client memory, drawn in fixed-size chunks.
#[derive(Debug)]
pub(crate) struct ClientStream {
    vertices: Vec<VertexTex3D>,
    capacity: usize,
}

impl ClientStream {
    /// `capacity` is rounded down to whole quads.
    pub fn new(capacity: usize) -> Self {
        let capacity = (capacity / 4 * 4).max(4);
        Self {
            vertices: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, vertex: VertexTex3D) {
        self.vertices.push(vertex);
        if self.vertices.len() >= self.capacity {
            self.flush(driver);
        }
    }

    pub fn flush<D: GpuDriver + ?Sized>(&mut self, driver: &mut D) {
        if self.vertices.is_empty() {
            return;
        }
        driver.draw_client(
            Topology::Quads,
            ClientFormat::VertexTex3D,
            bytemuck::cast_slice(&self.vertices),
        );
        self.vertices.clear();
    }
}

/// Container vertices read back from a buffer shadow.
///
/// Position is two floats; a textured container (two attributes) follows it
/// with three texture floats.
pub(crate) struct ShadowReader<'a> {
    data: &'a [u8],
    textured: bool,
}

impl<'a> ShadowReader<'a> {
    pub fn new(container: &ContainerEntry, buffers: &'a BufferTable) -> Option<Self> {
        let attr = container.info.attributes.first()?;
        let data = buffers.get(attr.buffer_index?)?.shadow()?;
        Some(Self {
            data,
            textured: container.info.attributes.len() == 2,
        })
    }

    fn stride(&self) -> usize {
        if self.textured { 20 } else { 8 }
    }

    pub fn vertex(&self, index: usize, color: [u8; 4], shift: [f32; 2]) -> Option<VertexTex3D> {
        let start = index * self.stride();
        let bytes = self.data.get(start..start + self.stride())?;
        let pos: [f32; 2] = bytemuck::pod_read_unaligned(&bytes[..8]);
        let tex: [f32; 3] = if self.textured {
            bytemuck::pod_read_unaligned(&bytes[8..20])
        } else {
            [0.0; 3]
        };
        Some(VertexTex3D {
            pos: [pos[0] + shift[0], pos[1] + shift[1]],
            color,
            tex,
        })
    }

    fn push_range<D: GpuDriver + ?Sized>(
        &self,
        driver: &mut D,
        stream: &mut ClientStream,
        first: usize,
        count: usize,
        color: [u8; 4],
        shift: [f32; 2],
    ) {
        for index in first..first + count {
            match self.vertex(index, color, shift) {
                Some(vertex) => stream.push(driver, vertex),
                None => {
                    log::debug!("container shadow ends before vertex {index}");
                    return;
                }
            }
        }
    }
}

/// Tile layer spans, `(offset, count)` in quad-index terms.
pub(crate) fn expand_tile_layer<D: GpuDriver + ?Sized>(
    driver: &mut D,
    stream: &mut ClientStream,
    reader: &ShadowReader<'_>,
    draws: &[TileDraw],
    color: [f32; 4],
) {
    let color = color_bytes(color);
    for draw in draws {
        let count = draw.index_count / INDICES_PER_QUAD * 4;
        reader.push_range(driver, stream, first_vertex(draw.index_offset), count, color, [0.0; 2]);
    }
    stream.flush(driver);
}

/// One quad per instance; x steps by `i % jump`, y by `i / jump`.
pub(crate) fn expand_border_tile<D: GpuDriver + ?Sized>(
    driver: &mut D,
    stream: &mut ClientStream,
    reader: &ShadowReader<'_>,
    cmd: &RenderBorderTile,
) {
    let color = color_bytes(cmd.color);
    let first = first_vertex(cmd.index_offset);
    let jump = cmd.jump_index.max(1);
    for i in 0..cmd.draw_num {
        let (x, y) = ((i % jump) as f32, (i / jump) as f32);
        let shift = [
            cmd.offset[0] + cmd.dir[0] * x,
            cmd.offset[1] + cmd.dir[1] * y,
        ];
        reader.push_range(driver, stream, first, 4, color, shift);
    }
    stream.flush(driver);
}

/// The whole line repeated per instance, stepping both axes by `i`.
pub(crate) fn expand_border_tile_line<D: GpuDriver + ?Sized>(
    driver: &mut D,
    stream: &mut ClientStream,
    reader: &ShadowReader<'_>,
    cmd: &RenderBorderTileLine,
) {
    let color = color_bytes(cmd.color);
    let first = first_vertex(cmd.index_offset);
    let count = cmd.index_count / INDICES_PER_QUAD * 4;
    for i in 0..cmd.draw_num {
        let step = i as f32;
        let shift = [
            cmd.offset[0] + cmd.dir[0] * step,
            cmd.offset[1] + cmd.dir[1] * step,
        ];
        reader.push_range(driver, stream, first, count, color, shift);
    }
    stream.flush(driver);
}
