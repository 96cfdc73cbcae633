/// Tiles per row and column when splitting an image into layers.
pub const LAYER_GRID: u32 = 16;

/// Splits an image into a 16x16 grid of equal tiles, one tile per layer.
///
/// Layer `x + y * 16` holds the tile at column `x`, row `y`. Returns the layer
/// size and the 256 concatenated layers, or `None` if either side is not a
/// non-zero multiple of 16.
pub fn split_into_layers(
    pixels: &[u8],
    width: u32,
    height: u32,
    channels: usize,
) -> Option<(u32, u32, Vec<u8>)> {
    if width == 0 || height == 0 || width % LAYER_GRID != 0 || height % LAYER_GRID != 0 {
        return None;
    }

    let layer_w = (width / LAYER_GRID) as usize;
    let layer_h = (height / LAYER_GRID) as usize;
    let src_row = width as usize * channels;
    let dst_row = layer_w * channels;
    let layer_size = dst_row * layer_h;

    if pixels.len() < src_row * height as usize {
        return None;
    }

    let grid = LAYER_GRID as usize;
    let mut out = vec![0u8; layer_size * grid * grid];

    for gy in 0..grid {
        for gx in 0..grid {
            let layer = gx + gy * grid;
            for row in 0..layer_h {
                let src = gy * src_row * layer_h + row * src_row + gx * dst_row;
                let dst = layer * layer_size + row * dst_row;
                out[dst..dst + dst_row].copy_from_slice(&pixels[src..src + dst_row]);
            }
        }
    }

    Some((layer_w as u32, layer_h as u32, out))
}

/// Reverses row order in place.
pub fn flip_rows(pixels: &mut [u8], width: u32, height: u32, channels: usize) {
    let row = width as usize * channels;
    let h = height as usize;
    if row == 0 || pixels.len() < row * h {
        return;
    }

    for y in 0..h / 2 {
        let (top, bottom) = pixels.split_at_mut((h - y - 1) * row);
        top[y * row..(y + 1) * row].swap_with_slice(&mut bottom[..row]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_places_tiles_in_layer_order() {
        // 32x32 single-channel image: each 2x2 tile filled with its layer index
        let (w, h) = (32u32, 32u32);
        let mut img = vec![0u8; (w * h) as usize];
        for y in 0..h {
            for x in 0..w {
                img[(y * w + x) as usize] = ((x / 2) + (y / 2) * 16) as u8;
            }
        }

        let (lw, lh, layers) = split_into_layers(&img, w, h, 1).expect("divisible by 16");
        assert_eq!((lw, lh), (2, 2));
        assert_eq!(layers.len(), 256 * 4);
        for layer in 0..256usize {
            assert!(layers[layer * 4..layer * 4 + 4].iter().all(|&p| p == layer as u8));
        }
    }

    #[test]
    fn split_rejects_non_multiple_of_grid() {
        assert!(split_into_layers(&[0; 48 * 32], 48, 32, 1).is_some());
        assert!(split_into_layers(&[0; 20 * 32], 20, 32, 1).is_none());
        assert!(split_into_layers(&[], 0, 0, 4).is_none());
    }

    #[test]
    fn flip_rows_reverses_order() {
        let mut px = vec![1, 1, 2, 2, 3, 3];
        flip_rows(&mut px, 2, 3, 1);
        assert_eq!(px, vec![3, 3, 2, 2, 1, 1]);
    }

    #[test]
    fn flip_rows_even_height() {
        let mut px = vec![1, 2, 3, 4];
        flip_rows(&mut px, 1, 4, 1);
        assert_eq!(px, vec![4, 3, 2, 1]);
    }
}
