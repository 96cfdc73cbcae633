use kiln_engine::command::{
    BlendMode, Command, CommandBuffer, CommandBufferFull, Primitive, RenderState, RenderStream,
    ScreenRect, Vertex,
};

const BACKGROUND: [f32; 4] = [0.08, 0.09, 0.12, 1.0];
const SPINNERS: usize = 6;

/// Demo scene: a ring of colored quads orbiting the center.
#[derive(Debug, Default)]
pub struct Scene {
    frame: u64,
}

impl Scene {
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Records one frame for a `width` x `height` drawable.
    pub fn record(
        &mut self,
        buffer: &mut CommandBuffer,
        width: u32,
        height: u32,
    ) -> Result<(), CommandBufferFull> {
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        let quads = self.quads(w, h);
        let vertices = buffer.alloc_pod(&quads)?;

        buffer.push(Command::Clear { color: BACKGROUND })?;
        buffer.push(Command::Render(RenderStream {
            state: RenderState::new(ScreenRect::new(0.0, 0.0, w, h)).with_blend(BlendMode::Alpha),
            primitive: Primitive::Quads,
            count: quads.len() / 4,
            vertices,
        }))?;
        self.frame += 1;
        Ok(())
    }

    fn quads(&self, w: f32, h: f32) -> Vec<Vertex> {
        let t = self.frame as f32 / 60.0;
        let center = [w / 2.0, h / 2.0];
        let radius = w.min(h) * 0.3;
        let half = w.min(h) * 0.06;

        let mut vertices = Vec::with_capacity(SPINNERS * 4);
        for i in 0..SPINNERS {
            let angle = t + i as f32 * std::f32::consts::TAU / SPINNERS as f32;
            let x = center[0] + angle.cos() * radius;
            let y = center[1] + angle.sin() * radius;
            let color = hue(i as f32 / SPINNERS as f32);
            vertices.extend([
                Vertex::new([x - half, y - half], [0.0, 0.0], color),
                Vertex::new([x + half, y - half], [1.0, 0.0], color),
                Vertex::new([x + half, y + half], [1.0, 1.0], color),
                Vertex::new([x - half, y + half], [0.0, 1.0], color),
            ]);
        }
        vertices
    }
}

/// Saturated RGBA8 color for a hue in `0..1`.
fn hue(h: f32) -> [u8; 4] {
    let channel = |offset: f32| {
        let k = (h * 6.0 + offset) % 6.0;
        let v = 1.0 - (k.min(4.0 - k).clamp(0.0, 1.0));
        (v * 255.0).round() as u8
    };
    [channel(5.0), channel(3.0), channel(1.0), 220]
}
