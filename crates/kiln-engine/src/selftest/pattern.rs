use crate::command::VertexTex3D;

/// Edge of one reference tile, in texels.
pub const TILE_SIZE: u32 = 64;

/// Layers of the reference texture.
pub const LAYER_COUNT: u32 = 256;

/// Tiles that carry a colour; five steps per channel.
pub const CHECK_COUNT: usize = 5 * 5 * 5;

/// Allowed difference per channel between sampled and reference colour.
pub const TOLERANCE: u8 = 25;

const GRID: usize = 16;
const STEP: u8 = 50;
const FIRST: u8 = 25;

/// Colour of reference tile `index`.
///
/// Blue steps fastest, then green, then red, each through 25..=225.
pub fn reference_color(index: usize) -> [u8; 4] {
    let step = |n: usize| FIRST + STEP * (n % 5) as u8;
    [step(index / 25), step(index / 5), step(index), 255]
}

/// RGBA layers of the reference texture, layer by layer.
///
/// The first [`CHECK_COUNT`] layers are filled with their reference colour,
/// the rest stay transparent black.
pub fn reference_layers() -> Vec<u8> {
    let layer_size = (TILE_SIZE * TILE_SIZE * 4) as usize;
    let mut data = vec![0u8; layer_size * LAYER_COUNT as usize];
    for (index, layer) in data.chunks_exact_mut(layer_size).take(CHECK_COUNT).enumerate() {
        let color = reference_color(index);
        for texel in layer.chunks_exact_mut(4) {
            texel.copy_from_slice(&color);
        }
    }
    data
}

/// One quad per checked tile on a 16x16 grid spanning clip space.
///
/// The third texture coordinate is the layer index for array textures and
/// the layer centre in 0..1 for 3D textures.
pub fn grid_quads(array_texture: bool) -> Vec<VertexTex3D> {
    let cell = 1.0 / GRID as f32;
    let mut vertices = Vec::with_capacity(CHECK_COUNT * 4);
    for i in 0..CHECK_COUNT {
        let x = (i % GRID) as f32 * cell;
        let y = (i / GRID) as f32 * cell;
        let w = if array_texture {
            i as f32
        } else {
            (i as f32 + 0.5) / LAYER_COUNT as f32
        };
        let corners = [
            ([x, y], [0.0, 0.0]),
            ([x + cell, y], [1.0, 0.0]),
            ([x + cell, y + cell], [1.0, 1.0]),
            ([x, y + cell], [0.0, 1.0]),
        ];
        vertices.extend(corners.into_iter().map(|([px, py], [u, v])| VertexTex3D {
            pos: [px * 2.0 - 1.0, py * 2.0 - 1.0],
            color: [255; 4],
            tex: [u, v, w],
        }));
    }
    vertices
}

/// Checks a read-back RGB framebuffer, rows bottom to top, against the
/// reference colours at the centre of each grid cell.
pub fn check_pixels(pixels: &[u8], width: u32, height: u32) -> bool {
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 || pixels.len() < w * h * 3 {
        return false;
    }

    let (tile_w, tile_h) = (w / GRID, h / GRID);
    let (start_x, start_y) = (tile_w / 2, tile_h / 2);
    let max_offset = w * h * 3 - 3;

    (0..CHECK_COUNT).all(|i| {
        let x = start_x + (i % GRID) * tile_w;
        let y = start_y + (i / GRID) * tile_h;
        let offset = (y * w * 3 + x * 3).min(max_offset);
        let expected = reference_color(i);
        pixels[offset..offset + 3]
            .iter()
            .zip(expected)
            .all(|(&got, want)| got.abs_diff(want) <= TOLERANCE)
    })
}

/// The framebuffer a correct driver produces for the self-test.
///
/// Headless hosts hand this to their device so the shader path can be
/// validated without a GPU.
pub fn reference_framebuffer(width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let mut pixels = vec![0u8; w * h * 3];
    let (tile_w, tile_h) = ((w / GRID).max(1), (h / GRID).max(1));
    for y in 0..h {
        for x in 0..w {
            let i = (y / tile_h) * GRID + x / tile_w;
            if x / tile_w >= GRID || i >= CHECK_COUNT {
                continue;
            }
            let [r, g, b, _] = reference_color(i);
            let offset = (y * w + x) * 3;
            pixels[offset..offset + 3].copy_from_slice(&[r, g, b]);
        }
    }
    pixels
}
