//! Pixel-buffer helpers used by the texture policy.
//!
//! The resampler itself sits behind [`Resizer`]; the default implementation
//! delegates to the `image` crate.

mod layers;
mod resize;

pub use layers::{flip_rows, split_into_layers, LAYER_GRID};
pub use resize::{ImageResizer, Resizer};

/// Largest power of two not above `value`; 0 for 0.
pub fn highest_bit(value: u32) -> u32 {
    if value == 0 {
        0
    } else {
        1 << (31 - value.leading_zeros())
    }
}

/// Bytes used by a texture and its mip chain.
///
/// Counts the base level, then keeps halving while both sides stay above 2.
pub fn mip_chain_footprint(width: u32, height: u32, pixel_size: usize) -> usize {
    let (mut w, mut h) = (width as usize, height as usize);
    let mut total = w * h * pixel_size;
    while w > 2 && h > 2 {
        w >>= 1;
        h >>= 1;
        total += w * h * pixel_size;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_bit_rounds_down() {
        assert_eq!(highest_bit(0), 0);
        assert_eq!(highest_bit(1), 1);
        assert_eq!(highest_bit(100), 64);
        assert_eq!(highest_bit(128), 128);
        assert_eq!(highest_bit(1023), 512);
    }

    #[test]
    fn footprint_includes_mips() {
        // 8x8 -> 4x4 -> 2x2, stops once a side reaches 2
        assert_eq!(mip_chain_footprint(8, 8, 4), (64 + 16 + 4) * 4);
        assert_eq!(mip_chain_footprint(2, 64, 1), 128);
    }

    #[test]
    fn footprint_of_64_square_rgba() {
        let expected: usize = [64usize, 32, 16, 8, 4, 2]
            .iter()
            .map(|s| s * s * 4)
            .sum();
        assert_eq!(mip_chain_footprint(64, 64, 4), expected);
    }
}
