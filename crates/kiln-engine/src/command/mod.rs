//! Command record model and the buffer the producer records into.
//!
//! A record is a `Command` value: an opcode-bearing enum with its fixed
//! parameters inline and an optional [`Payload`]. Records run strictly in the
//! order they were pushed.

mod buffer;
mod payload;
mod record;
mod reply;
mod types;

pub use buffer::{CommandBuffer, CommandBufferFull};
pub use payload::{InlineSpan, Payload};
pub use record::{
    BufferUpload, Command, Opcode, PlatformInit, RenderBorderTile, RenderBorderTileLine,
    RenderQuadContainer, RenderQuadContainerEx, RenderQuadLayer, RenderSpriteMultiple,
    RenderStream, RenderTileLayer, TextureCreate, TextureUpdate, TierInit, TileDraw,
};
pub use reply::{CompletionSignal, ReplySlot};
pub use types::*;
