//! Little-endian record encoding shared by the writer and the arena reader.

use crate::edges::Edge;
use crate::error::{SnapshotError, SnapshotResult};
use crate::identity::{Category, IdentityRef, NodeIdentity};

/// Name length byte announcing a u16 length after it.
pub(crate) const EXTENDED_NAME_MARKER: u8 = 0xFF;

/// Nodes per arena block on load.
pub const NODES_PER_CHUNK: usize = 4096;

pub(crate) fn write_identity(buf: &mut Vec<u8>, category: Category, name: &str) -> SnapshotResult<()> {
    let bytes = name.as_bytes();
    buf.extend_from_slice(&category.code().to_le_bytes());
    if bytes.len() < EXTENDED_NAME_MARKER as usize {
        buf.push(bytes.len() as u8);
    } else {
        let len = u16::try_from(bytes.len())
            .map_err(|_| SnapshotError::NameTooLong { len: bytes.len() })?;
        buf.push(EXTENDED_NAME_MARKER);
        buf.extend_from_slice(&len.to_le_bytes());
    }
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Appends one node record: identity, then the edge list with its total.
pub(crate) fn write_node(buf: &mut Vec<u8>, id: &NodeIdentity, edges: &[Edge]) -> SnapshotResult<()> {
    write_identity(buf, id.category(), id.name())?;

    let total: f32 = edges.iter().map(Edge::mass).sum();
    buf.extend_from_slice(&total.to_le_bytes());
    // Callers cap edges at a u16 edge capacity.
    buf.extend_from_slice(&(edges.len() as u16).to_le_bytes());
    for edge in edges {
        buf.extend_from_slice(&edge.mass().to_le_bytes());
        write_identity(buf, edge.target().category(), edge.target().name())?;
    }
    Ok(())
}

/// Bounds-checked reader over one record.
#[derive(Clone)]
pub(crate) struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, len: usize) -> SnapshotResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(SnapshotError::Truncated("node record overruns its offset span"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> SnapshotResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u16(&mut self) -> SnapshotResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub(crate) fn f32(&mut self) -> SnapshotResult<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    pub(crate) fn identity(&mut self) -> SnapshotResult<IdentityRef<'a>> {
        let category = Category(self.u16()?);
        let short = self.array::<1>()?[0];
        let len = if short == EXTENDED_NAME_MARKER {
            self.u16()? as usize
        } else {
            short as usize
        };
        let name = std::str::from_utf8(self.take(len)?)?;
        Ok(IdentityRef::new(category, name))
    }
}

/// Decodes a whole record, returning the bytes it consumed and the hash of
/// the node's identity.
pub(crate) fn validate_record(record: &[u8]) -> SnapshotResult<(usize, u64)> {
    let mut cursor = ByteCursor::new(record);
    let id = cursor.identity()?;
    let _total = cursor.f32()?;
    let edge_count = cursor.u16()?;
    for _ in 0..edge_count {
        cursor.f32()?;
        cursor.identity()?;
    }
    Ok((cursor.position(), id.hash_code()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name_layout() {
        let mut buf = Vec::new();
        write_identity(&mut buf, Category::WORD, "abc").unwrap();
        assert_eq!(buf, [1, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_extended_name_layout() {
        let name = "x".repeat(300);
        let mut buf = Vec::new();
        write_identity(&mut buf, Category::BOOK, &name).unwrap();
        assert_eq!(&buf[..5], &[6, 0, 0xFF, 0x2C, 0x01]);
        assert_eq!(buf.len(), 5 + 300);

        let mut cursor = ByteCursor::new(&buf);
        let id = cursor.identity().unwrap();
        assert_eq!(id.name().len(), 300);
        assert!(cursor.is_at_end());
    }

    #[test]
    fn test_name_at_marker_length_uses_extended_form() {
        let name = "y".repeat(255);
        let mut buf = Vec::new();
        write_identity(&mut buf, Category::WORD, &name).unwrap();
        assert_eq!(buf[2], EXTENDED_NAME_MARKER);
        assert_eq!(u16::from_le_bytes([buf[3], buf[4]]), 255);
    }

    #[test]
    fn test_oversized_name_rejected() {
        let name = "z".repeat(70_000);
        let mut buf = Vec::new();
        let err = write_identity(&mut buf, Category::WORD, &name).unwrap_err();
        assert!(matches!(err, SnapshotError::NameTooLong { len: 70_000 }));
    }

    #[test]
    fn test_node_record_validates() {
        let id = NodeIdentity::word("light");
        let edges = vec![
            Edge::new(NodeIdentity::word("truth"), 2.0),
            Edge::new(NodeIdentity::entity("Moroni"), 1.0),
        ];
        let mut buf = Vec::new();
        write_node(&mut buf, &id, &edges).unwrap();

        let (consumed, hash) = validate_record(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(hash, id.hash_code());

        let cut = &buf[..buf.len() - 1];
        assert!(matches!(validate_record(cut), Err(SnapshotError::Truncated(_))));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let buf = [1u8, 0, 2, 0xC3, 0x28];
        let mut cursor = ByteCursor::new(&buf);
        assert!(matches!(cursor.identity(), Err(SnapshotError::InvalidName(_))));
    }
}
