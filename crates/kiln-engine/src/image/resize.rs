use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Pixel, Rgb, Rgba};

/// Resamples tightly packed 8-bit pixel data.
pub trait Resizer: Send {
    /// Returns `dst_w * dst_h * channels` bytes.
    fn resize(
        &self,
        pixels: &[u8],
        src_w: u32,
        src_h: u32,
        dst_w: u32,
        dst_h: u32,
        channels: usize,
    ) -> Vec<u8>;
}

/// [`Resizer`] backed by `image::imageops`.
#[derive(Debug, Clone, Copy)]
pub struct ImageResizer {
    filter: FilterType,
}

impl Default for ImageResizer {
    fn default() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }
}

impl ImageResizer {
    pub fn with_filter(filter: FilterType) -> Self {
        Self { filter }
    }
}

fn resample<P>(pixels: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32, filter: FilterType) -> Option<Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let len = src_w as usize * src_h as usize * P::CHANNEL_COUNT as usize;
    let src: ImageBuffer<P, Vec<u8>> = ImageBuffer::from_raw(src_w, src_h, pixels.get(..len)?.to_vec())?;
    Some(imageops::resize(&src, dst_w, dst_h, filter).into_raw())
}

impl Resizer for ImageResizer {
    fn resize(
        &self,
        pixels: &[u8],
        src_w: u32,
        src_h: u32,
        dst_w: u32,
        dst_h: u32,
        channels: usize,
    ) -> Vec<u8> {
        let out_len = dst_w as usize * dst_h as usize * channels;
        if dst_w == 0 || dst_h == 0 {
            return Vec::new();
        }

        let resized = match channels {
            1 => resample::<Luma<u8>>(pixels, src_w, src_h, dst_w, dst_h, self.filter),
            3 => resample::<Rgb<u8>>(pixels, src_w, src_h, dst_w, dst_h, self.filter),
            4 => resample::<Rgba<u8>>(pixels, src_w, src_h, dst_w, dst_h, self.filter),
            _ => None,
        };

        resized.unwrap_or_else(|| {
            log::warn!(
                "resize {src_w}x{src_h} -> {dst_w}x{dst_h} ({channels} ch) with {} source bytes failed",
                pixels.len()
            );
            vec![0; out_len]
        })
    }
}
