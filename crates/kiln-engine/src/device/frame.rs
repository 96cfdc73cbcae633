use std::ops::Range;

use wgpu::util::DeviceExt;

use crate::command::ClipRect;
use crate::driver::Viewport;

use super::objects::{ITEM_WINDOW, align_up};
use super::pipeline::{globals_binding_size, items_binding_size};
use super::shader::Globals;

pub(super) enum VertexSource {
    Buffer(wgpu::Buffer),
    /// Byte offset into this frame's client arena.
    Client(u64),
}

pub(super) enum DrawSpan {
    Arrays {
        vertices: Range<u32>,
        instances: u32,
    },
    Indexed {
        buffer: wgpu::Buffer,
        indices: Range<u32>,
        base_vertex: i32,
        instances: u32,
    },
}

pub(super) struct PendingDraw {
    pub pipeline: wgpu::RenderPipeline,
    pub vertex: Vec<VertexSource>,
    pub span: DrawSpan,
    pub globals_offset: u32,
    pub items_offset: u32,
    pub texture: Option<wgpu::BindGroup>,
    pub viewport: Viewport,
    pub scissor: Option<ClipRect>,
}

/// Rectangle in target pixels, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Flips a bottom-origin rectangle into the target and clips it. `None` when
/// nothing is left.
pub(super) fn to_target_rect(
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    target: (u32, u32),
) -> Option<PixelRect> {
    let (tw, th) = (i64::from(target.0), i64::from(target.1));
    let left = i64::from(x).clamp(0, tw);
    let right = (i64::from(x) + i64::from(width)).clamp(0, tw);
    let top = (th - (i64::from(y) + i64::from(height))).clamp(0, th);
    let bottom = (th - i64::from(y)).clamp(0, th);
    if right <= left || bottom <= top {
        return None;
    }
    Some(PixelRect {
        x: left as u32,
        y: top as u32,
        width: (right - left) as u32,
        height: (bottom - top) as u32,
    })
}

/// Draws recorded since the last flush plus the per-frame data they index.
///
/// A draw only captures offsets into the arenas; the arenas become GPU
/// buffers when the frame is flushed.
pub(super) struct FrameRecorder {
    draws: Vec<PendingDraw>,
    globals: Vec<u8>,
    items: Vec<u8>,
    client: Vec<u8>,
    clear: Option<[f32; 4]>,
    uniform_align: usize,
    storage_align: usize,
}

impl FrameRecorder {
    pub fn new(limits: &wgpu::Limits) -> Self {
        Self {
            draws: Vec::new(),
            globals: Vec::new(),
            items: Vec::new(),
            client: Vec::new(),
            clear: None,
            uniform_align: limits.min_uniform_buffer_offset_alignment as usize,
            storage_align: limits.min_storage_buffer_offset_alignment as usize,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.draws.is_empty() && self.clear.is_none()
    }

    pub fn draw_count(&self) -> usize {
        self.draws.len()
    }

    pub fn push_globals(&mut self, globals: &Globals) -> u32 {
        push_aligned(&mut self.globals, bytemuck::bytes_of(globals), self.uniform_align)
    }

    pub fn push_items(&mut self, items: &[u8]) -> u32 {
        if items.is_empty() {
            return 0;
        }
        push_aligned(&mut self.items, items, self.storage_align)
    }

    pub fn push_client(&mut self, vertices: &[u8]) -> u64 {
        u64::from(push_aligned(
            &mut self.client,
            vertices,
            wgpu::COPY_BUFFER_ALIGNMENT as usize,
        ))
    }

    pub fn push(&mut self, draw: PendingDraw) {
        self.draws.push(draw);
    }

    /// Everything recorded so far would be overwritten; drop it.
    pub fn clear(&mut self, color: [f32; 4]) {
        self.reset();
        self.clear = Some(color);
    }

    fn reset(&mut self) {
        self.draws.clear();
        self.globals.clear();
        self.items.clear();
        self.client.clear();
    }

    /// Encodes the pending clear and draws into one pass on `target`.
    pub fn flush(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        globals_layout: &wgpu::BindGroupLayout,
        target: &wgpu::TextureView,
        target_size: (u32, u32),
    ) {
        if self.is_idle() {
            return;
        }

        // every dynamic offset must leave a full binding window behind it
        self.globals.resize(self.globals.len() + self.uniform_align, 0);
        self.items.resize(self.items.len() + ITEM_WINDOW, 0);

        let globals = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("kiln frame globals"),
            contents: &self.globals,
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let items = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("kiln frame items"),
            contents: &self.items,
            usage: wgpu::BufferUsages::STORAGE,
        });
        let client = (!self.client.is_empty()).then(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("kiln frame client vertices"),
                contents: &self.client,
                usage: wgpu::BufferUsages::VERTEX,
            })
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kiln frame bindings"),
            layout: globals_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &globals,
                        offset: 0,
                        size: globals_binding_size(),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &items,
                        offset: 0,
                        size: items_binding_size(),
                    }),
                },
            ],
        });

        let load = match self.clear.take() {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: f64::from(r),
                g: f64::from(g),
                b: f64::from(b),
                a: f64::from(a),
            }),
            None => wgpu::LoadOp::Load,
        };

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("kiln frame encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("kiln frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            for draw in &self.draws {
                let v = draw.viewport;
                let Some(viewport) = to_target_rect(v.x, v.y, v.width, v.height, target_size) else {
                    continue;
                };
                let scissor = match draw.scissor {
                    Some(clip) => match to_target_rect(clip.x, clip.y, clip.w, clip.h, target_size) {
                        Some(rect) => rect,
                        None => continue,
                    },
                    None => PixelRect {
                        x: 0,
                        y: 0,
                        width: target_size.0,
                        height: target_size.1,
                    },
                };

                pass.set_viewport(
                    viewport.x as f32,
                    viewport.y as f32,
                    viewport.width as f32,
                    viewport.height as f32,
                    0.0,
                    1.0,
                );
                pass.set_scissor_rect(scissor.x, scissor.y, scissor.width, scissor.height);
                pass.set_pipeline(&draw.pipeline);
                pass.set_bind_group(0, &bind_group, &[draw.globals_offset, draw.items_offset]);
                if let Some(texture) = &draw.texture {
                    pass.set_bind_group(1, texture, &[]);
                }
                for (slot, source) in draw.vertex.iter().enumerate() {
                    match source {
                        VertexSource::Buffer(buffer) => pass.set_vertex_buffer(slot as u32, buffer.slice(..)),
                        VertexSource::Client(offset) => {
                            if let Some(client) = &client {
                                pass.set_vertex_buffer(slot as u32, client.slice(*offset..));
                            }
                        }
                    }
                }
                match &draw.span {
                    DrawSpan::Arrays {
                        vertices,
                        instances,
                    } => pass.draw(vertices.clone(), 0..*instances),
                    DrawSpan::Indexed {
                        buffer,
                        indices,
                        base_vertex,
                        instances,
                    } => {
                        pass.set_index_buffer(buffer.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(indices.clone(), *base_vertex, 0..*instances);
                    }
                }
            }
        }
        queue.submit(std::iter::once(encoder.finish()));
        self.reset();
    }
}

fn push_aligned(arena: &mut Vec<u8>, bytes: &[u8], align: usize) -> u32 {
    let offset = align_up(arena.len(), align.max(1));
    arena.resize(offset, 0);
    arena.extend_from_slice(bytes);
    offset as u32
}
