use std::collections::HashMap;

use foundation::{Arena, EdgeKey, Handle, TriangleId, VertexId};

/// An undirected mesh edge and the triangles currently using it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment {
    pub v1: VertexId,
    pub v2: VertexId,
    /// One entry for a boundary edge, two for an interior edge.
    pub triangles: Vec<TriangleId>,
}

impl Segment {
    fn attach(&mut self, t: TriangleId) {
        if !self.triangles.contains(&t) {
            self.triangles.push(t);
        }
    }
}

/// Segment records plus the vertex-pair index pointing at them.
///
/// Both halves are only ever mutated together, so a key in `by_edge` always
/// names a live record.
#[derive(Debug, Default)]
pub(crate) struct SegmentTable {
    records: Arena<Segment>,
    by_edge: HashMap<EdgeKey, Handle>,
}

impl SegmentTable {
    pub fn lookup(&self, a: VertexId, b: VertexId) -> Option<Handle> {
        self.by_edge.get(&EdgeKey::new(a, b)).copied()
    }

    pub fn get(&self, h: Handle) -> Option<&Segment> {
        self.records.get(h)
    }

    /// Attaches `t` to the existing a-b segment, if there is one.
    pub fn attach(&mut self, a: VertexId, b: VertexId, t: TriangleId) -> Option<Handle> {
        let h = self.lookup(a, b)?;
        self.records.get_mut(h)?.attach(t);
        Some(h)
    }

    /// Creates a new a-b segment owned by `t`. The caller checks that none
    /// exists yet. Returns `None` once segment ids are exhausted.
    pub fn insert(&mut self, a: VertexId, b: VertexId, t: TriangleId) -> Option<Handle> {
        let h = self.records.try_alloc(Segment {
            v1: a,
            v2: b,
            triangles: vec![t],
        })?;
        self.by_edge.insert(EdgeKey::new(a, b), h);
        Some(h)
    }

    pub fn remove(&mut self, h: Handle) -> Option<Segment> {
        let seg = self.records.remove(h)?;
        self.by_edge.remove(&EdgeKey::new(seg.v1, seg.v2));
        Some(seg)
    }

    /// Drops `t` from the a-b segment's triangle list. The record itself
    /// survives because a neighbouring triangle may still use it.
    pub fn detach(&mut self, a: VertexId, b: VertexId, t: TriangleId) {
        if let Some(h) = self.lookup(a, b)
            && let Some(seg) = self.records.get_mut(h)
        {
            seg.triangles.retain(|&other| other != t);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &Segment)> {
        self.records.iter()
    }
}
