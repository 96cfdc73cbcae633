use std::fmt;

/// Byte range inside a command buffer's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineSpan {
    pub(crate) offset: usize,
    pub(crate) len: usize,
}

/// Variable-length data attached to a record.
///
/// `Inline` bytes live in the buffer's arena and are rewound with it.
/// `Owned` data is moved into the record by the producer and dropped by the
/// render thread after the record executes; the producer cannot reach it
/// again once it is enqueued.
#[derive(Default)]
pub enum Payload {
    #[default]
    None,
    Inline(InlineSpan),
    Owned(Box<[u8]>),
}

impl Payload {
    pub fn owned(bytes: impl Into<Box<[u8]>>) -> Self {
        Payload::Owned(bytes.into())
    }

    /// Resolves the payload to bytes. `arena` is the buffer the record came from.
    pub fn bytes<'a>(&'a self, arena: &'a [u8]) -> &'a [u8] {
        match self {
            Payload::None => &[],
            Payload::Inline(span) => arena
                .get(span.offset..span.offset + span.len)
                .unwrap_or(&[]),
            Payload::Owned(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::None => 0,
            Payload::Inline(span) => span.len,
            Payload::Owned(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the payload out as `T` values. Trailing bytes are ignored.
    pub fn read_pod<T: bytemuck::Pod>(&self, arena: &[u8]) -> Vec<T> {
        self.bytes(arena)
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::None => f.write_str("None"),
            Payload::Inline(span) => write!(f, "Inline({}..+{})", span.offset, span.len),
            Payload::Owned(bytes) => write!(f, "Owned({} bytes)", bytes.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Vertex;

    #[test]
    fn inline_resolves_against_arena() {
        let arena = [0u8, 1, 2, 3, 4, 5];
        let payload = Payload::Inline(InlineSpan { offset: 2, len: 3 });
        assert_eq!(payload.bytes(&arena), &[2, 3, 4]);
        assert_eq!(payload.len(), 3);
    }

    #[test]
    fn owned_ignores_arena() {
        let payload = Payload::owned(vec![9u8, 8, 7]);
        assert_eq!(payload.bytes(&[]), &[9, 8, 7]);
    }

    #[test]
    fn none_is_empty() {
        assert!(Payload::None.is_empty());
        assert!(Payload::None.bytes(&[1, 2]).is_empty());
    }

    #[test]
    fn read_pod_from_unaligned_bytes() {
        let v = Vertex::new([1.0, 2.0], [0.5, 0.25], [1, 2, 3, 4]);
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(bytemuck::bytes_of(&v));
        let arena = bytes.as_slice();
        let payload = Payload::Inline(InlineSpan { offset: 1, len: 20 });
        assert_eq!(payload.read_pod::<Vertex>(arena), vec![v]);
    }
}
