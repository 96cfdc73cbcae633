use crate::command::{RenderState, Screenshot};
use crate::driver::{GpuDriver, ProgramId, TextureBinding};
use crate::image::flip_rows;
use crate::resources::{StateCache, TextureSlot};

use super::texture::TextureStore;

fn apply_wrap<D: GpuDriver + ?Sized>(driver: &mut D, entry: &mut TextureSlot, state: &RenderState) {
    if entry.last_wrap != state.wrap {
        if let Some(sampler) = entry.sampler {
            driver.set_sampler_wrap(sampler, state.wrap);
        }
        entry.last_wrap = state.wrap;
    }
}

fn binding_for(entry: &TextureSlot, layered: bool) -> Option<TextureBinding> {
    if layered {
        entry.binding_layered()
    } else {
        entry.binding_2d()
    }
}

/// Fixed-pipeline state: blend always applied, one texture unit, projection
/// through the fixed matrix.
pub(crate) fn bind_fixed_state<D: GpuDriver + ?Sized>(
    driver: &mut D,
    cache: &mut StateCache,
    textures: &mut TextureStore,
    state: &RenderState,
    layered: bool,
) {
    cache.force_blend(driver, state.blend);
    cache.apply_clip(driver, state.clip);

    let binding = state.texture.and_then(|slot| {
        let entry = textures.get_mut(slot)?;
        if !layered {
            apply_wrap(driver, entry, state);
        }
        binding_for(entry, layered)
    });
    driver.bind_texture(0, binding);
    driver.set_fixed_projection(state.screen.ortho());
}

/// Program state. Everything goes through the cache so unchanged blend,
/// bindings and uniforms are not re-sent.
pub(crate) fn bind_program_state<D: GpuDriver + ?Sized>(
    driver: &mut D,
    cache: &mut StateCache,
    textures: &mut TextureStore,
    state: &RenderState,
    program: ProgramId,
    layered: bool,
    multi_unit: bool,
) {
    cache.apply_blend(driver, state.blend);
    cache.apply_clip(driver, state.clip);

    if let Some(slot) = state.texture {
        if let Some(entry) = textures.get_mut(slot) {
            let unit = cache.bind_texture(driver, slot, binding_for(entry, layered), layered, multi_unit);
            cache.set_sampler_unit(driver, program, unit);
            if !layered {
                apply_wrap(driver, entry, state);
            }
        }
    }

    cache.set_screen(driver, program, state.screen);
}

/// Reads the viewport back as top-down RGB.
pub(crate) fn screenshot<D: GpuDriver + ?Sized>(driver: &mut D) -> Screenshot {
    let viewport = driver.viewport();
    let mut pixels = driver.read_pixels(viewport);
    flip_rows(&mut pixels, viewport.width, viewport.height, 3);
    Screenshot {
        width: viewport.width,
        height: viewport.height,
        pixels,
    }
}

/// Byte prefix of a streamed payload covering `count` primitives.
pub(crate) fn stream_bytes(bytes: &[u8], vertices: usize, stride: usize) -> &[u8] {
    let wanted = vertices * stride;
    if bytes.len() < wanted {
        log::debug!("stream payload holds {} of {wanted} bytes", bytes.len());
    }
    &bytes[..wanted.min(bytes.len())]
}
