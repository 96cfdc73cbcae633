use std::collections::HashMap;
use std::num::NonZeroU64;

use crate::command::BlendMode;

use super::objects::{ITEM_WINDOW, VertexSignature};
use super::shader::{self, Globals, Sampled, ShaderKey};

/// Colour format of the offscreen target every draw renders into.
pub(super) const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct PipelineKey {
    pub shader: ShaderKey,
    pub vertex: VertexSignature,
    pub lines: bool,
    pub blend: BlendMode,
}

fn blend_state(mode: BlendMode) -> Option<wgpu::BlendState> {
    let component = |dst_factor| wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor,
        operation: wgpu::BlendOperation::Add,
    };
    let state = |dst_factor| wgpu::BlendState {
        color: component(dst_factor),
        alpha: component(dst_factor),
    };
    match mode {
        BlendMode::None => None,
        BlendMode::Alpha => Some(state(wgpu::BlendFactor::OneMinusSrcAlpha)),
        BlendMode::Additive => Some(state(wgpu::BlendFactor::One)),
    }
}

pub(super) fn globals_binding_size() -> Option<NonZeroU64> {
    NonZeroU64::new(size_of::<Globals>() as u64)
}

pub(super) fn items_binding_size() -> Option<NonZeroU64> {
    NonZeroU64::new(ITEM_WINDOW as u64)
}

fn texture_entries(dimension: wgpu::TextureViewDimension) -> [wgpu::BindGroupLayoutEntry; 2] {
    [
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: dimension,
                multisampled: false,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
    ]
}

/// Render pipelines built on demand, one per distinct key.
pub(super) struct PipelineCache {
    globals_layout: wgpu::BindGroupLayout,
    texture_layouts: HashMap<Sampled, wgpu::BindGroupLayout>,
    shaders: HashMap<ShaderKey, wgpu::ShaderModule>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    blit: Option<(wgpu::TextureFormat, wgpu::RenderPipeline, wgpu::BindGroupLayout)>,
}

impl PipelineCache {
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer_entry = |binding, ty, min_binding_size| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty,
                has_dynamic_offset: true,
                min_binding_size,
            },
            count: None,
        };
        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kiln globals layout"),
            entries: &[
                buffer_entry(0, wgpu::BufferBindingType::Uniform, globals_binding_size()),
                buffer_entry(
                    1,
                    wgpu::BufferBindingType::Storage { read_only: true },
                    items_binding_size(),
                ),
            ],
        });
        Self {
            globals_layout,
            texture_layouts: HashMap::new(),
            shaders: HashMap::new(),
            pipelines: HashMap::new(),
            blit: None,
        }
    }

    pub fn globals_layout(&self) -> &wgpu::BindGroupLayout {
        &self.globals_layout
    }

    pub fn texture_layout(&mut self, device: &wgpu::Device, sampled: Sampled) -> wgpu::BindGroupLayout {
        let dimension = match sampled {
            Sampled::None | Sampled::D2 => wgpu::TextureViewDimension::D2,
            Sampled::D2Array => wgpu::TextureViewDimension::D2Array,
            Sampled::D3 => wgpu::TextureViewDimension::D3,
        };
        self.texture_layouts
            .entry(sampled)
            .or_insert_with(|| {
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("kiln texture layout"),
                    entries: &texture_entries(dimension),
                })
            })
            .clone()
    }

    pub fn pipeline(&mut self, device: &wgpu::Device, key: &PipelineKey) -> wgpu::RenderPipeline {
        if let Some(pipeline) = self.pipelines.get(key) {
            return pipeline.clone();
        }
        let pipeline = self.build(device, key);
        self.pipelines.insert(key.clone(), pipeline.clone());
        log::debug!("built pipeline #{} for {:?}", self.pipelines.len(), key.shader);
        pipeline
    }

    fn build(&mut self, device: &wgpu::Device, key: &PipelineKey) -> wgpu::RenderPipeline {
        let module = self
            .shaders
            .entry(key.shader)
            .or_insert_with(|| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("kiln program"),
                    source: wgpu::ShaderSource::Wgsl(shader::source(key.shader).into()),
                })
            })
            .clone();

        let texture_layout = match key.shader.sampled {
            Sampled::None => None,
            sampled => Some(self.texture_layout(device, sampled)),
        };
        let mut layouts = vec![&self.globals_layout];
        layouts.extend(texture_layout.as_ref());
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("kiln pipeline layout"),
            bind_group_layouts: &layouts,
            immediate_size: 0,
        });

        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = key
            .vertex
            .slots
            .iter()
            .map(|slot| wgpu::VertexBufferLayout {
                array_stride: u64::from(slot.stride),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &slot.attributes,
            })
            .collect();

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("kiln pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: blend_state(key.blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: if key.lines {
                    wgpu::PrimitiveTopology::LineList
                } else {
                    wgpu::PrimitiveTopology::TriangleList
                },
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    }

    /// Pipeline copying the offscreen target onto a surface of `format`.
    pub fn blit(
        &mut self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
    ) -> (wgpu::RenderPipeline, wgpu::BindGroupLayout) {
        if let Some((cached, pipeline, layout)) = &self.blit
            && *cached == format
        {
            return (pipeline.clone(), layout.clone());
        }

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kiln blit layout"),
            entries: &texture_entries(wgpu::TextureViewDimension::D2),
        });
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("kiln blit"),
            source: wgpu::ShaderSource::Wgsl(shader::BLIT.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("kiln blit pipeline layout"),
            bind_group_layouts: &[&layout],
            immediate_size: 0,
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("kiln blit pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });
        self.blit = Some((format, pipeline.clone(), layout.clone()));
        (pipeline, layout)
    }
}
