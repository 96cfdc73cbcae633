use std::fmt;

use crate::config::EngineConfig;

use super::payload::{InlineSpan, Payload};
use super::record::Command;

/// Producer-side overflow of a command buffer.
///
/// Capacity is fixed per buffer; hitting it is a caller error. The usual
/// response is to flush and record into the next buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferFull {
    Records { capacity: usize },
    Arena { requested: usize, remaining: usize },
}

impl fmt::Display for CommandBufferFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandBufferFull::Records { capacity } => {
                write!(f, "command buffer full ({capacity} records)")
            }
            CommandBufferFull::Arena {
                requested,
                remaining,
            } => write!(
                f,
                "command arena full (requested {requested} bytes, {remaining} remaining)"
            ),
        }
    }
}

impl std::error::Error for CommandBufferFull {}

/// Ordered records plus an arena for inline payloads.
///
/// A buffer is either being recorded by the producer or owned by the render
/// thread; ownership moves with the value.
pub struct CommandBuffer {
    records: Vec<Command>,
    arena: Vec<u8>,
    record_capacity: usize,
    arena_capacity: usize,
}

impl CommandBuffer {
    pub fn new(record_capacity: usize, arena_capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(record_capacity.min(4096)),
            arena: Vec::with_capacity(arena_capacity),
            record_capacity,
            arena_capacity,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.command_buffer_capacity, config.command_arena_capacity)
    }

    /// Drops every record and rewinds the arena. Backing storage is kept.
    pub fn reset(&mut self) {
        self.records.clear();
        self.arena.clear();
    }

    /// Appends a record.
    pub fn push(&mut self, command: Command) -> Result<(), CommandBufferFull> {
        if self.records.len() >= self.record_capacity {
            return Err(CommandBufferFull::Records {
                capacity: self.record_capacity,
            });
        }
        self.records.push(command);
        Ok(())
    }

    /// Copies `bytes` into the arena and returns an inline payload for them.
    pub fn alloc_inline(&mut self, bytes: &[u8]) -> Result<Payload, CommandBufferFull> {
        let remaining = self.remaining_arena();
        if bytes.len() > remaining {
            return Err(CommandBufferFull::Arena {
                requested: bytes.len(),
                remaining,
            });
        }

        let offset = self.arena.len();
        self.arena.extend_from_slice(bytes);
        Ok(Payload::Inline(InlineSpan {
            offset,
            len: bytes.len(),
        }))
    }

    /// Typed variant of [`alloc_inline`](Self::alloc_inline).
    pub fn alloc_pod<T: bytemuck::Pod>(&mut self, items: &[T]) -> Result<Payload, CommandBufferFull> {
        self.alloc_inline(bytemuck::cast_slice(items))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn remaining_arena(&self) -> usize {
        self.arena_capacity.saturating_sub(self.arena.len())
    }

    pub fn records(&self) -> &[Command] {
        &self.records
    }

    /// Moves the records out in submission order, alongside the arena they
    /// reference. The arena is rewound by the next `reset`.
    pub fn drain(&mut self) -> (std::vec::Drain<'_, Command>, &[u8]) {
        (self.records.drain(..), &self.arena)
    }
}

impl fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("records", &self.records.len())
            .field("arena_bytes", &self.arena.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Opcode, Vertex};

    // ── append ────────────────────────────────────────────────────────────

    #[test]
    fn push_until_record_capacity() {
        let mut buf = CommandBuffer::new(2, 16);
        assert!(buf.push(Command::Nop).is_ok());
        assert!(buf.push(Command::Nop).is_ok());
        assert_eq!(
            buf.push(Command::Nop),
            Err(CommandBufferFull::Records { capacity: 2 })
        );
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn arena_overflow_is_reported() {
        let mut buf = CommandBuffer::new(8, 8);
        assert!(buf.alloc_inline(&[0; 6]).is_ok());
        let err = buf.alloc_inline(&[0; 3]).err();
        assert_eq!(
            err,
            Some(CommandBufferFull::Arena {
                requested: 3,
                remaining: 2
            })
        );
    }

    // ── reset ─────────────────────────────────────────────────────────────

    #[test]
    fn reset_rewinds_without_shrinking() {
        let mut buf = CommandBuffer::new(8, 64);
        let _ = buf.alloc_inline(&[1; 40]);
        let _ = buf.push(Command::Nop);
        buf.reset();
        assert!(buf.is_empty());
        assert_eq!(buf.remaining_arena(), 64);
        assert!(buf.arena.capacity() >= 64);
    }

    // ── drain ─────────────────────────────────────────────────────────────

    #[test]
    fn drain_preserves_order_and_payloads() {
        let mut buf = CommandBuffer::new(8, 256);
        let verts = [Vertex::default(); 3];
        let payload = buf.alloc_pod(&verts).expect("arena fits three vertices");
        let _ = buf.push(Command::Nop);
        let _ = buf.push(Command::UpdateBufferObject {
            index: 4,
            offset: 0,
            data: payload,
        });
        let _ = buf.push(Command::Shutdown);

        let (records, arena) = buf.drain();
        let mut seen = Vec::new();
        for cmd in records {
            if let Command::UpdateBufferObject { data, .. } = &cmd {
                assert_eq!(data.bytes(arena).len(), 60);
            }
            seen.push(cmd.opcode());
        }
        assert_eq!(
            seen,
            vec![Opcode::Nop, Opcode::UpdateBufferObject, Opcode::Shutdown]
        );
        assert!(buf.is_empty());
    }
}
