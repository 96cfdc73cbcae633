//! Tile-map self-test.
//!
//! Renders a reference layered texture through the candidate pipeline and
//! samples the result. It runs once, at tier start-up, outside the normal
//! dispatch path; the caller caches a pass so later sessions skip it.

mod pattern;

pub use pattern::{
    CHECK_COUNT, LAYER_COUNT, TILE_SIZE, TOLERANCE, check_pixels, grid_quads, reference_color,
    reference_framebuffer, reference_layers,
};

use std::mem::size_of;

use crate::command::{AttributeType, BlendMode, TextureFormat, VertexTex3D, WrapMode};
use crate::driver::{
    BufferKind, ClientFormat, DrawCall, GpuDriver, ProgramId, SamplerDesc, TextureBinding,
    TextureDesc, TextureTarget, Topology, Uniform, VertexBinding, mip_level_count,
};

const IDENTITY: [[f32; 4]; 2] = [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]];

/// Programs the shader path is validated with.
#[derive(Debug, Clone, Copy)]
pub struct SelfTestPrograms {
    pub primitive_3d: ProgramId,
    pub tile: ProgramId,
}

/// Runs the self-test. `programs` is `None` when only the fixed pipeline
/// is available. Returns true when every sampled tile matches.
pub fn run<D: GpuDriver + ?Sized>(
    driver: &mut D,
    array_texture: bool,
    programs: Option<SelfTestPrograms>,
) -> bool {
    let target = if array_texture {
        TextureTarget::D2Array
    } else {
        TextureTarget::D3
    };
    let desc = TextureDesc {
        target,
        width: TILE_SIZE,
        height: TILE_SIZE,
        depth: LAYER_COUNT,
        format: TextureFormat::Rgba,
        mip_levels: if array_texture {
            mip_level_count(TILE_SIZE, TILE_SIZE, None)
        } else {
            1
        },
    };
    let Some(texture) = driver.create_texture(&desc) else {
        log::warn!("self-test: driver could not create the reference texture");
        return false;
    };
    driver.upload_texture(texture, desc.full_region(), desc.format, &reference_layers());
    if array_texture {
        driver.generate_mipmaps(texture);
    }
    let sampler = driver.create_sampler(&SamplerDesc {
        wrap: WrapMode::Clamp,
        mipmapped: array_texture,
        ..SamplerDesc::default()
    });

    driver.set_clear_color([0.0, 0.0, 0.0, 1.0]);
    driver.set_blend(BlendMode::Alpha);
    driver.set_scissor(None);
    driver.bind_texture(
        0,
        Some(TextureBinding {
            texture,
            sampler,
            target,
        }),
    );

    let vertices = grid_quads(array_texture);
    let mut passed = draw_step(driver, &vertices, programs.map(|p| p.primitive_3d), false);
    if passed {
        if let Some(programs) = programs {
            passed = draw_step(driver, &vertices, Some(programs.tile), true);
        }
    }

    driver.bind_texture(0, None);
    driver.delete_texture(texture);
    if let Some(sampler) = sampler {
        driver.delete_sampler(sampler);
    }

    if passed {
        log::info!("tile-map self-test passed");
    } else {
        log::warn!("tile-map self-test failed");
    }
    passed
}

fn draw_step<D: GpuDriver + ?Sized>(
    driver: &mut D,
    vertices: &[VertexTex3D],
    program: Option<ProgramId>,
    tile_program: bool,
) -> bool {
    driver.clear();

    match program {
        Some(program) => {
            driver.use_program(Some(program));
            driver.set_uniform(program, Uniform::TextureUnit(0));
            if tile_program {
                driver.set_uniform(program, Uniform::Color([1.0; 4]));
            }
            driver.set_uniform(program, Uniform::Ortho(IDENTITY));
        }
        None => {
            driver.use_program(None);
            driver.set_fixed_projection(IDENTITY);
        }
    }

    if tile_program {
        draw_from_buffer(driver, vertices);
    } else {
        driver.draw_client(
            Topology::Quads,
            ClientFormat::VertexTex3D,
            bytemuck::cast_slice(vertices),
        );
    }

    if program.is_some() {
        driver.use_program(None);
    }
    driver.finish();

    let viewport = driver.viewport();
    if viewport.width == 0 || viewport.height == 0 {
        return false;
    }
    let pixels = driver.read_pixels(viewport);
    check_pixels(&pixels, viewport.width, viewport.height)
}

fn draw_from_buffer<D: GpuDriver + ?Sized>(driver: &mut D, vertices: &[VertexTex3D]) {
    let bytes: &[u8] = bytemuck::cast_slice(vertices);
    let Some(buffer) = driver.create_buffer(BufferKind::Vertex, bytes.len(), Some(bytes)) else {
        return;
    };
    let Some(layout) = driver.create_vertex_layout() else {
        driver.delete_buffer(buffer);
        return;
    };

    let stride = size_of::<VertexTex3D>() as u32;
    driver.set_vertex_attributes(
        layout,
        &[
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
        ],
    );
    driver.draw(
        layout,
        DrawCall::arrays(Topology::Quads, 0, vertices.len() as u32),
    );

    driver.delete_vertex_layout(layout);
    driver.delete_buffer(buffer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{ProgramKind, RecordingDriver};

    fn passing_driver() -> RecordingDriver {
        let mut d = RecordingDriver::with_version("3.0.0");
        let (w, h) = (d.viewport.width, d.viewport.height);
        d.set_framebuffer(w, h, reference_framebuffer(w, h));
        d
    }

    fn programs(d: &mut RecordingDriver) -> SelfTestPrograms {
        SelfTestPrograms {
            primitive_3d: d
                .create_program(ProgramKind::Primitive3D { textured: true })
                .expect("program"),
            tile: d
                .create_program(ProgramKind::Tile { textured: true })
                .expect("program"),
        }
    }

    #[test]
    fn passes_on_correct_output_with_shaders() {
        let mut d = passing_driver();
        let p = programs(&mut d);
        assert!(run(&mut d, true, Some(p)));
        // one client draw, one buffer draw
        assert_eq!(d.draw_count(), 2);
        assert_eq!(d.live_textures(), 0);
        assert_eq!(d.live_buffers(), 0);
        assert!(d.layouts.is_empty());
    }

    #[test]
    fn fixed_pipeline_runs_one_step() {
        let mut d = passing_driver();
        assert!(run(&mut d, false, None));
        assert_eq!(d.draw_count(), 1);
        assert!(d.fixed_projection.is_some());
    }

    #[test]
    fn fails_on_blank_output() {
        let mut d = RecordingDriver::with_version("3.0.0");
        let p = programs(&mut d);
        assert!(!run(&mut d, true, Some(p)));
        // the second step never runs after a failure
        assert_eq!(d.draw_count(), 1);
        assert_eq!(d.live_textures(), 0);
    }

    #[test]
    fn zero_viewport_fails() {
        let mut d = passing_driver();
        d.viewport.width = 0;
        assert!(!run(&mut d, true, None));
    }
}
