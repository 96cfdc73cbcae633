use std::borrow::Cow;

use crate::command::{TextureCreate, TextureFlags, TextureFormat, TextureUpdate, WrapMode, MAX_TEXTURES};
use crate::driver::{
    GpuDriver, SamplerDesc, TextureDesc, TextureRegion, TextureTarget, mip_level_count,
};
use crate::image::{Resizer, highest_bit, mip_chain_footprint, split_into_layers, LAYER_GRID};
use crate::negotiate::Capabilities;
use crate::resources::{SlotTable, TextureMemory, TextureSlot};

/// Textures at least this large on both sides get a capped mip chain.
const LARGE_TEXTURE: u32 = 1024;
const LARGE_TEXTURE_MAX_LEVEL: u32 = 5;

/// Sides at or below this are never halved for quality reasons.
const DOWNSCALE_FLOOR: u32 = 16;

/// How a tier turns a create request into driver textures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexturePolicy {
    /// Non-power-of-two sizes upload as-is.
    pub npot: bool,
    pub mipmaps: bool,
    /// Halve textures that already fit unless they ask for `QUALITY`.
    pub downscale: bool,
    pub lod_bias: Option<f32>,
    pub texture_2d_array: bool,
    pub textures_3d: bool,
    /// Cap the mip chain of large textures.
    pub cap_large_mips: bool,
    /// Only the array flags build a layered form.
    pub arrays_only: bool,
}

impl TexturePolicy {
    /// Policy of the legacy and emulated tiers.
    pub fn fixed(capabilities: &Capabilities, lod_bias: Option<f32>) -> Self {
        Self {
            npot: capabilities.npot_textures,
            mipmaps: capabilities.mipmapping,
            downscale: true,
            lod_bias,
            texture_2d_array: capabilities.texture_2d_array,
            textures_3d: capabilities.textures_3d,
            cap_large_mips: false,
            arrays_only: false,
        }
    }

    pub fn core(lod_bias: Option<f32>) -> Self {
        Self {
            npot: true,
            mipmaps: true,
            downscale: false,
            lod_bias,
            texture_2d_array: true,
            textures_3d: true,
            cap_large_mips: true,
            arrays_only: true,
        }
    }

    /// Target of the layered form `flags` ask for, if the tier builds one.
    fn layered_target(&self, flags: TextureFlags) -> Option<TextureTarget> {
        if self.arrays_only {
            let wanted = flags
                .intersects(TextureFlags::TO_2D_ARRAY | TextureFlags::TO_2D_ARRAY_SINGLE_LAYER);
            return wanted.then_some(TextureTarget::D2Array);
        }
        if !flags.wants_layered() {
            return None;
        }
        Some(if flags.wants_3d() {
            TextureTarget::D3
        } else {
            TextureTarget::D2Array
        })
    }

    fn supports(&self, target: TextureTarget) -> bool {
        match target {
            TextureTarget::D2 => true,
            TextureTarget::D2Array => self.texture_2d_array,
            TextureTarget::D3 => self.textures_3d,
        }
    }
}

/// The texture table of one tier, with the memory it charges.
pub struct TextureStore {
    slots: SlotTable<TextureSlot>,
    memory: TextureMemory,
    policy: TexturePolicy,
    max_size: u32,
}

impl TextureStore {
    /// Resets `memory`; the new tier starts with nothing allocated.
    pub fn new(policy: TexturePolicy, max_size: u32, memory: TextureMemory) -> Self {
        memory.reset();
        Self {
            slots: SlotTable::with_len(MAX_TEXTURES),
            memory,
            policy,
            max_size: max_size.max(1),
        }
    }

    pub fn policy(&self) -> &TexturePolicy {
        &self.policy
    }

    pub fn memory(&self) -> &TextureMemory {
        &self.memory
    }

    pub fn get(&self, slot: u32) -> Option<&TextureSlot> {
        self.slots.get(slot as usize)
    }

    pub fn get_mut(&mut self, slot: u32) -> Option<&mut TextureSlot> {
        self.slots.get_mut(slot as usize)
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_live()).count()
    }

    pub fn create<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        resizer: &dyn Resizer,
        cmd: &TextureCreate,
        data: &[u8],
    ) {
        let channels = cmd.format.channels();
        let (mut width, mut height) = (cmd.width, cmd.height);
        if width == 0 || height == 0 {
            log::warn!("texture {}: refusing {width}x{height} image", cmd.slot);
            return;
        }
        if data.len() < width as usize * height as usize * channels {
            log::warn!("texture {}: {} bytes for a {width}x{height} image", cmd.slot, data.len());
            return;
        }

        let policy = self.policy;
        let mut pixels = Cow::Borrowed(data);
        let mut resize_ratio = None;

        if !policy.npot {
            let (pot_w, pot_h) = (highest_bit(width), highest_bit(height));
            if (pot_w, pot_h) != (width, height) {
                pixels = Cow::Owned(resizer.resize(&pixels, width, height, pot_w, pot_h, channels));
                resize_ratio = Some((pot_w as f32 / width as f32, pot_h as f32 / height as f32));
                width = pot_w;
                height = pot_h;
            }
        }

        let (fit_w, fit_h) = (width, height);
        let mut rescale_count = 0;
        if width > self.max_size || height > self.max_size {
            while width > self.max_size || height > self.max_size {
                width = (width >> 1).max(1);
                height = (height >> 1).max(1);
                rescale_count += 1;
            }
        } else if policy.downscale
            && cmd.format != TextureFormat::Alpha
            && width > DOWNSCALE_FLOOR
            && height > DOWNSCALE_FLOOR
            && !cmd.flags.contains(TextureFlags::QUALITY)
        {
            width >>= 1;
            height >>= 1;
            rescale_count = 1;
        }
        if rescale_count > 0 {
            pixels = Cow::Owned(resizer.resize(&pixels, fit_w, fit_h, width, height, channels));
        }

        let entry = self.slots.slot_mut(cmd.slot as usize);
        if entry.is_live() {
            log::debug!("texture {} recreated without destroy", cmd.slot);
            self.memory.sub(entry.release(driver));
        }

        let mipmapped = policy.mipmaps && !cmd.flags.contains(TextureFlags::NO_MIPMAPS);
        let max_level = (policy.cap_large_mips && width >= LARGE_TEXTURE && height >= LARGE_TEXTURE)
            .then_some(LARGE_TEXTURE_MAX_LEVEL);

        if !cmd.flags.contains(TextureFlags::NO_2D) {
            let desc = TextureDesc {
                target: TextureTarget::D2,
                width,
                height,
                depth: 1,
                format: cmd.format,
                mip_levels: if mipmapped {
                    mip_level_count(width, height, max_level)
                } else {
                    1
                },
            };
            entry.tex = driver.create_texture(&desc);
            match entry.tex {
                Some(tex) => {
                    driver.upload_texture(tex, desc.full_region(), cmd.format, &pixels);
                    if mipmapped {
                        driver.generate_mipmaps(tex);
                    }
                    entry.sampler = driver.create_sampler(&SamplerDesc {
                        wrap: WrapMode::Repeat,
                        mipmapped,
                        lod_bias: if mipmapped { policy.lod_bias } else { None },
                        max_level,
                    });
                }
                None => log::warn!("texture {}: driver could not create a 2D texture", cmd.slot),
            }
        }

        if mipmapped {
            if let Some(target) = policy.layered_target(cmd.flags) {
                if policy.supports(target) {
                    build_layered(driver, resizer, entry, cmd, target, &pixels, (width, height), policy.lod_bias);
                } else {
                    log::warn!("texture {}: {target:?} textures are unavailable", cmd.slot);
                }
            }
        }

        entry.width = width;
        entry.height = height;
        entry.rescale_count = rescale_count;
        entry.resize_ratio = resize_ratio;
        entry.last_wrap = WrapMode::Repeat;
        entry.mem_size = mip_chain_footprint(width, height, channels);
        self.memory.add(entry.mem_size);
    }

    /// Uploads a sub-rectangle, mapped into the stored texture's coordinates.
    pub fn update<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        resizer: &dyn Resizer,
        cmd: &TextureUpdate,
        data: &[u8],
    ) {
        let Some(entry) = self.slots.get(cmd.slot as usize) else {
            return;
        };
        let Some(tex) = entry.tex else {
            log::warn!("update of texture {} without a 2D image", cmd.slot);
            return;
        };
        let channels = cmd.format.channels();
        let (mut x, mut y, mut width, mut height) = (cmd.x, cmd.y, cmd.width, cmd.height);
        if data.len() < width as usize * height as usize * channels {
            log::warn!("texture {}: short update payload", cmd.slot);
            return;
        }
        let mut pixels = Cow::Borrowed(data);

        if let Some((ratio_w, ratio_h)) = entry.resize_ratio {
            let (new_w, new_h) = ((width as f32 * ratio_w) as u32, (height as f32 * ratio_h) as u32);
            pixels = Cow::Owned(resizer.resize(&pixels, width, height, new_w, new_h, channels));
            width = new_w;
            height = new_h;
        }

        if entry.rescale_count > 0 {
            let (old_w, old_h) = (width, height);
            for _ in 0..entry.rescale_count {
                width = (width >> 1).max(1);
                height = (height >> 1).max(1);
                x /= 2;
                y /= 2;
            }
            pixels = Cow::Owned(resizer.resize(&pixels, old_w, old_h, width, height, channels));
        }

        if width == 0 || height == 0 {
            return;
        }
        driver.upload_texture(tex, TextureRegion::rect(x, y, width, height), cmd.format, &pixels);
    }

    pub fn destroy<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, slot: u32) {
        if let Some(entry) = self.slots.get_mut(slot as usize) {
            self.memory.sub(entry.release(driver));
        }
    }

    pub fn release_all<D: GpuDriver + ?Sized>(&mut self, driver: &mut D) {
        for entry in self.slots.iter_mut() {
            self.memory.sub(entry.release(driver));
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_layered<D: GpuDriver + ?Sized>(
    driver: &mut D,
    resizer: &dyn Resizer,
    entry: &mut TextureSlot,
    cmd: &TextureCreate,
    target: TextureTarget,
    pixels: &[u8],
    (width, height): (u32, u32),
    lod_bias: Option<f32>,
) {
    let channels = cmd.format.channels();
    let mipmapped = target == TextureTarget::D2Array;

    let (layer_w, layer_h, depth, layers) = if cmd.flags.single_layer() {
        (width, height, 1, Cow::Borrowed(pixels))
    } else {
        let (mut src_w, mut src_h) = (width, height);
        let mut src = Cow::Borrowed(pixels);
        if src_w % LAYER_GRID != 0 || src_h % LAYER_GRID != 0 {
            let new_w = highest_bit(src_w).max(LAYER_GRID);
            let new_h = highest_bit(src_h).max(LAYER_GRID);
            src = Cow::Owned(resizer.resize(&src, src_w, src_h, new_w, new_h, channels));
            src_w = new_w;
            src_h = new_h;
        }
        let Some((lw, lh, split)) = split_into_layers(&src, src_w, src_h, channels) else {
            log::warn!("texture {}: could not split into layers", cmd.slot);
            return;
        };
        (lw, lh, LAYER_GRID * LAYER_GRID, Cow::Owned(split))
    };

    let desc = TextureDesc {
        target,
        width: layer_w,
        height: layer_h,
        depth,
        format: cmd.format,
        mip_levels: if mipmapped {
            mip_level_count(layer_w, layer_h, None)
        } else {
            1
        },
    };
    let Some(tex) = driver.create_texture(&desc) else {
        log::warn!("texture {}: driver could not create a {target:?} texture", cmd.slot);
        return;
    };
    driver.upload_texture(tex, desc.full_region(), cmd.format, &layers);
    if mipmapped {
        driver.generate_mipmaps(tex);
    }
    entry.layered = Some(tex);
    entry.layered_target = Some(target);
    entry.layered_sampler = driver.create_sampler(&SamplerDesc {
        wrap: WrapMode::Clamp,
        mipmapped,
        lod_bias: if mipmapped { lod_bias } else { None },
        max_level: None,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Payload;
    use crate::driver::RecordingDriver;
    use crate::image::ImageResizer;

    fn create(slot: u32, width: u32, height: u32, format: TextureFormat, flags: TextureFlags) -> (TextureCreate, Vec<u8>) {
        let data = vec![0x7f; (width * height) as usize * format.channels()];
        (
            TextureCreate {
                slot,
                width,
                height,
                format,
                flags,
                data: Payload::None,
            },
            data,
        )
    }

    fn core_store() -> TextureStore {
        TextureStore::new(TexturePolicy::core(None), 16384, TextureMemory::new())
    }

    fn fixed_store(npot: bool) -> TextureStore {
        let caps = Capabilities {
            npot_textures: npot,
            mipmapping: true,
            texture_2d_array: true,
            textures_3d: true,
            ..Capabilities::default()
        };
        TextureStore::new(TexturePolicy::fixed(&caps, None), 16384, TextureMemory::new())
    }

    // ── memory accounting ──

    #[test]
    fn create_destroy_returns_memory_to_zero() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let resizer = ImageResizer::default();
        for (w, h, format) in [
            (64, 64, TextureFormat::Rgba),
            (100, 30, TextureFormat::Rgb),
            (1, 1, TextureFormat::Alpha),
            (2048, 1024, TextureFormat::Rgba),
        ] {
            let mut store = core_store();
            let (cmd, data) = create(3, w, h, format, TextureFlags::NONE);
            store.create(&mut d, &resizer, &cmd, &data);
            assert!(store.memory().get() > 0);
            store.destroy(&mut d, 3);
            assert_eq!(store.memory().get(), 0, "{w}x{h} {format:?}");
            assert_eq!(store.live_count(), 0);
        }
        assert_eq!(d.live_textures(), 0);
        assert!(d.samplers.is_empty());
    }

    #[test]
    fn recreate_without_destroy_does_not_leak() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let resizer = ImageResizer::default();
        let mut store = core_store();
        let (cmd, data) = create(0, 32, 32, TextureFormat::Rgba, TextureFlags::NONE);
        store.create(&mut d, &resizer, &cmd, &data);
        store.create(&mut d, &resizer, &cmd, &data);
        assert_eq!(store.memory().get(), mip_chain_footprint(32, 32, 4));
        assert_eq!(d.live_textures(), 1);
    }

    // ── size policy ──

    #[test]
    fn npot_resize_keeps_reported_dimensions() {
        let mut d = RecordingDriver::with_version("1.5.0");
        let resizer = ImageResizer::default();
        let mut store = fixed_store(false);
        let (cmd, data) = create(
            0,
            100,
            60,
            TextureFormat::Rgba,
            TextureFlags::QUALITY | TextureFlags::NO_MIPMAPS,
        );
        store.create(&mut d, &resizer, &cmd, &data);

        let slot = store.get(0).expect("slot");
        assert_eq!((slot.width, slot.height), (64, 32));
        let (rw, rh) = slot.resize_ratio.expect("ratio");
        assert_eq!((100.0 * rw) as u32, 64);
        assert_eq!((60.0 * rh) as u32, 32);

        // a full-size update maps back onto the stored image
        let update = TextureUpdate {
            slot: 0,
            x: 0,
            y: 0,
            width: 100,
            height: 60,
            format: TextureFormat::Rgba,
            data: Payload::None,
        };
        store.update(&mut d, &resizer, &update, &data);
        let tex = store.get(0).and_then(|s| s.tex).expect("tex");
        let last = *d.textures[&tex].uploads.last().expect("upload");
        assert_eq!((last.width, last.height), (64, 32));
    }

    #[test]
    fn oversized_texture_is_halved_until_it_fits() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let resizer = ImageResizer::default();
        let mut store = TextureStore::new(TexturePolicy::core(None), 64, TextureMemory::new());
        let (cmd, data) = create(1, 256, 128, TextureFormat::Rgb, TextureFlags::NONE);
        store.create(&mut d, &resizer, &cmd, &data);
        let slot = store.get(1).expect("slot");
        assert_eq!((slot.width, slot.height, slot.rescale_count), (64, 32, 2));

        let update = TextureUpdate {
            slot: 1,
            x: 8,
            y: 4,
            width: 16,
            height: 16,
            format: TextureFormat::Rgb,
            data: Payload::None,
        };
        store.update(&mut d, &resizer, &update, &vec![0; 16 * 16 * 3]);
        let tex = store.get(1).and_then(|s| s.tex).expect("tex");
        let last = *d.textures[&tex].uploads.last().expect("upload");
        assert_eq!((last.x, last.y, last.width, last.height), (2, 1, 4, 4));
    }

    #[test]
    fn thin_texture_keeps_one_texel_while_halving() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let resizer = ImageResizer::default();
        let mut store = TextureStore::new(TexturePolicy::core(None), 64, TextureMemory::new());
        let (cmd, data) = create(1, 512, 2, TextureFormat::Rgba, TextureFlags::NONE);
        store.create(&mut d, &resizer, &cmd, &data);
        let slot = store.get(1).expect("slot");
        assert_eq!((slot.width, slot.height, slot.rescale_count), (64, 1, 3));

        let update = TextureUpdate {
            slot: 1,
            x: 0,
            y: 0,
            width: 512,
            height: 2,
            format: TextureFormat::Rgba,
            data: Payload::None,
        };
        store.update(&mut d, &resizer, &update, &vec![0; 512 * 2 * 4]);
        let tex = store.get(1).and_then(|s| s.tex).expect("tex");
        let last = *d.textures[&tex].uploads.last().expect("upload");
        assert_eq!((last.width, last.height), (64, 1));
    }

    #[test]
    fn fixed_tiers_halve_unless_quality() {
        let mut d = RecordingDriver::with_version("3.0.0");
        let resizer = ImageResizer::default();
        let mut store = fixed_store(true);
        let (plain, data) = create(0, 64, 64, TextureFormat::Rgba, TextureFlags::NONE);
        store.create(&mut d, &resizer, &plain, &data);
        assert_eq!(store.get(0).map(|s| s.width), Some(32));

        let (quality, data) = create(1, 64, 64, TextureFormat::Rgba, TextureFlags::QUALITY);
        store.create(&mut d, &resizer, &quality, &data);
        assert_eq!(store.get(1).map(|s| s.width), Some(64));

        let (alpha, data) = create(2, 64, 64, TextureFormat::Alpha, TextureFlags::NONE);
        store.create(&mut d, &resizer, &alpha, &data);
        assert_eq!(store.get(2).map(|s| s.width), Some(64));
    }

    #[test]
    fn large_textures_cap_the_mip_chain() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let resizer = ImageResizer::default();
        let mut store = core_store();
        let (cmd, data) = create(0, 1024, 1024, TextureFormat::Alpha, TextureFlags::NONE);
        store.create(&mut d, &resizer, &cmd, &data);
        let slot = store.get(0).expect("slot");
        let sampler = d.samplers[&slot.sampler.expect("sampler")];
        assert_eq!(sampler.max_level, Some(5));
        assert_eq!(d.textures[&slot.tex.expect("tex")].desc.mip_levels, 6);
    }

    // ── layered form ──

    #[test]
    fn array_flag_splits_into_layers() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let resizer = ImageResizer::default();
        let mut store = core_store();
        let (cmd, data) = create(0, 256, 256, TextureFormat::Rgba, TextureFlags::TO_2D_ARRAY);
        store.create(&mut d, &resizer, &cmd, &data);
        let slot = store.get(0).expect("slot");
        let layered = &d.textures[&slot.layered.expect("layered")];
        assert_eq!(layered.desc.target, TextureTarget::D2Array);
        assert_eq!((layered.desc.width, layered.desc.depth), (16, 256));
        assert!(layered.mipmaps);
    }

    #[test]
    fn single_layer_is_not_split() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let resizer = ImageResizer::default();
        let mut store = core_store();
        let (cmd, data) = create(
            0,
            40,
            40,
            TextureFormat::Rgba,
            TextureFlags::TO_2D_ARRAY_SINGLE_LAYER | TextureFlags::NO_2D,
        );
        store.create(&mut d, &resizer, &cmd, &data);
        let slot = store.get(0).expect("slot");
        assert!(slot.tex.is_none());
        let layered = &d.textures[&slot.layered.expect("layered")];
        assert_eq!((layered.desc.width, layered.desc.depth), (40, 1));
    }

    #[test]
    fn odd_sizes_are_resized_before_splitting() {
        let mut d = RecordingDriver::with_version("3.0.0");
        let resizer = ImageResizer::default();
        let mut store = fixed_store(true);
        let (cmd, data) = create(
            0,
            24,
            24,
            TextureFormat::Rgba,
            TextureFlags::TO_3D | TextureFlags::QUALITY,
        );
        store.create(&mut d, &resizer, &cmd, &data);
        let slot = store.get(0).expect("slot");
        let layered = &d.textures[&slot.layered.expect("layered")];
        // 24 -> 16, split into 1x1 layers
        assert_eq!(layered.desc.target, TextureTarget::D3);
        assert_eq!((layered.desc.width, layered.desc.height), (1, 1));
        assert!(!layered.mipmaps);
    }

    #[test]
    fn core_ignores_volume_flags() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let resizer = ImageResizer::default();
        let mut store = core_store();
        let (cmd, data) = create(0, 32, 32, TextureFormat::Rgba, TextureFlags::TO_3D);
        store.create(&mut d, &resizer, &cmd, &data);
        assert!(store.get(0).and_then(|s| s.layered).is_none());
    }

    #[test]
    fn no_mipmaps_skips_layered_form() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let resizer = ImageResizer::default();
        let mut store = core_store();
        let (cmd, data) = create(
            0,
            32,
            32,
            TextureFormat::Rgba,
            TextureFlags::TO_2D_ARRAY | TextureFlags::NO_MIPMAPS,
        );
        store.create(&mut d, &resizer, &cmd, &data);
        let slot = store.get(0).expect("slot");
        assert!(slot.layered.is_none());
        assert!(!d.textures[&slot.tex.expect("tex")].mipmaps);
    }
}
