use crate::config::{ApiVersion, EngineConfig};
use crate::negotiate::{InitReport, TierInitReport};

use super::payload::Payload;
use super::reply::{CompletionSignal, ReplySlot};
use super::types::{
    ContainerInfo, Primitive, QuadRenderInfo, RenderState, Screenshot, SpriteInstance,
    TextureFlags, TextureFormat, VideoMode,
};

/// Opcode of a record; what dispatch fragments match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop,
    Signal,

    Init,
    Shutdown,
    Swap,
    VSync,
    Resize,
    UpdateViewport,
    VideoModes,

    TierInit,
    TierShutdown,
    TextureCreate,
    TextureUpdate,
    TextureDestroy,
    Clear,
    Screenshot,
    Render,
    RenderTex3D,

    CreateBufferObject,
    RecreateBufferObject,
    UpdateBufferObject,
    CopyBufferObject,
    DeleteBufferObject,

    CreateBufferContainer,
    UpdateBufferContainer,
    DeleteBufferContainer,
    IndicesRequiredNumNotify,

    RenderTileLayer,
    RenderBorderTile,
    RenderBorderTileLine,
    RenderQuadLayer,
    RenderQuadContainer,
    RenderQuadContainerEx,
    RenderQuadContainerAsSpriteMultiple,
}

/// One recorded operation.
#[derive(Debug)]
pub enum Command {
    Nop,
    Signal(CompletionSignal),

    // ── platform ──
    Init(PlatformInit),
    Shutdown,
    Swap {
        finish: bool,
    },
    VSync {
        interval: i32,
        reply: ReplySlot<bool>,
    },
    Resize {
        width: u32,
        height: u32,
    },
    UpdateViewport {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    VideoModes {
        screen: u32,
        reply: ReplySlot<Vec<VideoMode>>,
    },

    // ── tier: lifecycle, textures, frame ──
    TierInit(TierInit),
    TierShutdown,
    TextureCreate(TextureCreate),
    TextureUpdate(TextureUpdate),
    TextureDestroy {
        slot: u32,
    },
    Clear {
        color: [f32; 4],
    },
    Screenshot {
        reply: ReplySlot<Screenshot>,
    },
    Render(RenderStream),
    RenderTex3D(RenderStream),

    // ── tier: buffer objects ──
    CreateBufferObject(BufferUpload),
    RecreateBufferObject(BufferUpload),
    UpdateBufferObject {
        index: u32,
        offset: usize,
        data: Payload,
    },
    CopyBufferObject {
        src: u32,
        dst: u32,
        src_offset: usize,
        dst_offset: usize,
        size: usize,
    },
    DeleteBufferObject {
        index: u32,
    },

    // ── tier: containers ──
    CreateBufferContainer {
        index: u32,
        info: ContainerInfo,
    },
    UpdateBufferContainer {
        index: u32,
        info: ContainerInfo,
    },
    DeleteBufferContainer {
        index: u32,
        destroy_buffers: bool,
    },
    IndicesRequiredNumNotify {
        required: usize,
    },

    // ── tier: container draws ──
    RenderTileLayer(RenderTileLayer),
    RenderBorderTile(RenderBorderTile),
    RenderBorderTileLine(RenderBorderTileLine),
    RenderQuadLayer(RenderQuadLayer),
    RenderQuadContainer(RenderQuadContainer),
    RenderQuadContainerEx(RenderQuadContainerEx),
    RenderQuadContainerAsSpriteMultiple(RenderSpriteMultiple),
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Nop => Opcode::Nop,
            Command::Signal(_) => Opcode::Signal,
            Command::Init(_) => Opcode::Init,
            Command::Shutdown => Opcode::Shutdown,
            Command::Swap { .. } => Opcode::Swap,
            Command::VSync { .. } => Opcode::VSync,
            Command::Resize { .. } => Opcode::Resize,
            Command::UpdateViewport { .. } => Opcode::UpdateViewport,
            Command::VideoModes { .. } => Opcode::VideoModes,
            Command::TierInit(_) => Opcode::TierInit,
            Command::TierShutdown => Opcode::TierShutdown,
            Command::TextureCreate(_) => Opcode::TextureCreate,
            Command::TextureUpdate(_) => Opcode::TextureUpdate,
            Command::TextureDestroy { .. } => Opcode::TextureDestroy,
            Command::Clear { .. } => Opcode::Clear,
            Command::Screenshot { .. } => Opcode::Screenshot,
            Command::Render(_) => Opcode::Render,
            Command::RenderTex3D(_) => Opcode::RenderTex3D,
            Command::CreateBufferObject(_) => Opcode::CreateBufferObject,
            Command::RecreateBufferObject(_) => Opcode::RecreateBufferObject,
            Command::UpdateBufferObject { .. } => Opcode::UpdateBufferObject,
            Command::CopyBufferObject { .. } => Opcode::CopyBufferObject,
            Command::DeleteBufferObject { .. } => Opcode::DeleteBufferObject,
            Command::CreateBufferContainer { .. } => Opcode::CreateBufferContainer,
            Command::UpdateBufferContainer { .. } => Opcode::UpdateBufferContainer,
            Command::DeleteBufferContainer { .. } => Opcode::DeleteBufferContainer,
            Command::IndicesRequiredNumNotify { .. } => Opcode::IndicesRequiredNumNotify,
            Command::RenderTileLayer(_) => Opcode::RenderTileLayer,
            Command::RenderBorderTile(_) => Opcode::RenderBorderTile,
            Command::RenderBorderTileLine(_) => Opcode::RenderBorderTileLine,
            Command::RenderQuadLayer(_) => Opcode::RenderQuadLayer,
            Command::RenderQuadContainer(_) => Opcode::RenderQuadContainer,
            Command::RenderQuadContainerEx(_) => Opcode::RenderQuadContainerEx,
            Command::RenderQuadContainerAsSpriteMultiple(_) => {
                Opcode::RenderQuadContainerAsSpriteMultiple
            }
        }
    }
}

// ── record parameter blocks ───────────────────────────────────────────────

/// Context negotiation request.
#[derive(Debug)]
pub struct PlatformInit {
    pub config: EngineConfig,
    /// Highest version the loader's entry points provide.
    pub loader: ApiVersion,
    pub reply: ReplySlot<InitReport>,
}

#[derive(Debug)]
pub struct TierInit {
    pub reply: ReplySlot<TierInitReport>,
}

#[derive(Debug)]
pub struct TextureCreate {
    pub slot: u32,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub flags: TextureFlags,
    pub data: Payload,
}

#[derive(Debug)]
pub struct TextureUpdate {
    pub slot: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Payload,
}

/// Streamed vertices drawn without a persistent container.
#[derive(Debug)]
pub struct RenderStream {
    pub state: RenderState,
    pub primitive: Primitive,
    /// Number of primitives.
    pub count: usize,
    pub vertices: Payload,
}

#[derive(Debug)]
pub struct BufferUpload {
    pub index: u32,
    /// Byte size; larger than `data` means the tail is zero-filled.
    pub size: usize,
    pub data: Payload,
}

/// One indexed span of a tile layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileDraw {
    /// Byte offset into the quad index buffer.
    pub index_offset: usize,
    /// Number of indices.
    pub index_count: usize,
}

#[derive(Debug)]
pub struct RenderTileLayer {
    pub state: RenderState,
    pub color: [f32; 4],
    pub container: u32,
    pub draws: Vec<TileDraw>,
}

#[derive(Debug)]
pub struct RenderBorderTile {
    pub state: RenderState,
    pub color: [f32; 4],
    pub container: u32,
    pub index_offset: usize,
    pub offset: [f32; 2],
    pub dir: [f32; 2],
    pub jump_index: u32,
    pub draw_num: u32,
}

#[derive(Debug)]
pub struct RenderBorderTileLine {
    pub state: RenderState,
    pub color: [f32; 4],
    pub container: u32,
    pub index_offset: usize,
    pub index_count: usize,
    pub offset: [f32; 2],
    pub dir: [f32; 2],
    pub draw_num: u32,
}

#[derive(Debug)]
pub struct RenderQuadLayer {
    pub state: RenderState,
    pub container: u32,
    pub quads: Vec<QuadRenderInfo>,
    /// First quad of the container to draw.
    pub quad_offset: usize,
}

#[derive(Debug)]
pub struct RenderQuadContainer {
    pub state: RenderState,
    pub container: u32,
    pub index_offset: usize,
    pub index_count: usize,
}

#[derive(Debug)]
pub struct RenderQuadContainerEx {
    pub state: RenderState,
    pub container: u32,
    pub index_offset: usize,
    pub index_count: usize,
    pub color: [f32; 4],
    pub center: [f32; 2],
    pub rotation: f32,
}

#[derive(Debug)]
pub struct RenderSpriteMultiple {
    pub state: RenderState,
    pub container: u32,
    pub index_offset: usize,
    pub index_count: usize,
    pub center: [f32; 2],
    pub color: [f32; 4],
    pub sprites: Vec<SpriteInstance>,
}
