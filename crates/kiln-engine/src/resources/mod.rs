//! Render-thread resource tables.
//!
//! Every table is owned by one tier instance and touched only from the
//! render thread.

mod buffer;
mod container;
mod quad_index;
mod state_cache;
mod stream;
mod table;
mod texture;

pub use buffer::{BufferEntry, BufferTable};
pub use container::{ContainerEntry, ContainerTable};
pub use quad_index::{QuadIndexBuffer, quad_indices};
pub use state_cache::{ProgramUniforms, StateCache, UnitBinding};
pub use stream::{StreamBuffer, StreamPool};
pub use table::SlotTable;
pub use texture::{TextureMemory, TextureSlot};
