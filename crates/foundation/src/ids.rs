/// Index of a mesh vertex. Vertices are append-only, so the index is the identity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(pub u32);

impl VertexId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a mesh triangle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TriangleId(pub u32);

impl TriangleId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Canonical key for an unordered vertex pair.
///
/// The smaller index lives in the high 32 bits, so `(a, b)` and `(b, a)`
/// produce the same key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeKey(u64);

impl EdgeKey {
    pub fn new(a: VertexId, b: VertexId) -> Self {
        let (lo, hi) = if a.0 <= b.0 { (a.0, b.0) } else { (b.0, a.0) };
        EdgeKey(((lo as u64) << 32) | hi as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::{EdgeKey, VertexId};

    #[test]
    fn edge_key_is_unordered() {
        let a = VertexId(7);
        let b = VertexId(3);
        assert_eq!(EdgeKey::new(a, b), EdgeKey::new(b, a));
        assert_ne!(EdgeKey::new(a, b), EdgeKey::new(a, a));
    }

    #[test]
    fn edge_key_handles_large_indices() {
        let a = VertexId(u32::MAX);
        let b = VertexId(0);
        assert_eq!(EdgeKey::new(a, b), EdgeKey::new(b, a));
        assert_ne!(EdgeKey::new(a, b), EdgeKey::new(a, VertexId(1)));
        assert_ne!(EdgeKey::new(a, b), EdgeKey::new(VertexId(u32::MAX - 1), b));
    }
}
