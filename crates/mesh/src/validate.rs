use foundation::math::orient2d;
use foundation::{TriangleId, VertexId};

use crate::error::CorruptionError;
use crate::refiner::MeshRefiner;

impl<P> MeshRefiner<P> {
    /// Walks the whole mesh and checks that triangles and segments agree.
    ///
    /// Every segment must be used by one or two triangles that contain its
    /// edge, every triangle edge must have a segment naming that triangle,
    /// and no triangle may have flipped relative to the seed it came from.
    /// Cost is linear in the mesh size; meant for tests and debug tooling.
    pub fn validate(&self) -> Result<(), CorruptionError> {
        for (_, seg) in self.segments.iter() {
            let (v1, v2) = (seg.v1.0, seg.v2.0);
            match seg.triangles.len() {
                0 => return Err(CorruptionError::OrphanSegment { v1, v2 }),
                1 | 2 => {}
                n => {
                    return Err(CorruptionError::SegmentOverShared {
                        v1,
                        v2,
                        triangles: n,
                    });
                }
            }
            for &t in &seg.triangles {
                let tri = self
                    .triangles
                    .get(t.index())
                    .ok_or(CorruptionError::MissingTriangle { triangle: t.0 })?;
                if !has_edge(tri, seg.v1, seg.v2) {
                    return Err(CorruptionError::DetachedTriangle {
                        triangle: t.0,
                        v1,
                        v2,
                    });
                }
            }
        }

        for (i, tri) in self.triangles.iter().enumerate() {
            let t = TriangleId(i as u32);
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                let seg = self
                    .segments
                    .lookup(a, b)
                    .and_then(|h| self.segments.get(h))
                    .ok_or(CorruptionError::MissingSegment { v1: a.0, v2: b.0 })?;
                if !seg.triangles.contains(&t) {
                    return Err(CorruptionError::DetachedTriangle {
                        triangle: t.0,
                        v1: a.0,
                        v2: b.0,
                    });
                }
            }

            let expected = self.winding[i];
            if expected != 0.0 {
                let area = orient2d(
                    self.unprojected[tri[0].index()],
                    self.unprojected[tri[1].index()],
                    self.unprojected[tri[2].index()],
                );
                if area * expected <= 0.0 {
                    return Err(CorruptionError::OrientationFlip { triangle: t.0 });
                }
            }
        }
        Ok(())
    }
}

fn has_edge(tri: &[VertexId; 3], a: VertexId, b: VertexId) -> bool {
    tri.contains(&a) && tri.contains(&b)
}
