use foundation::math::{StableF64, Vec2, orient2d};
use foundation::{Handle, TriangleId, VertexId};
use runtime::{FrameBudget, Metrics, WorkQueue};
use tracing::{debug, trace, warn};

use crate::error::{CorruptionError, InputError, MeshError};
use crate::output::MeshSnapshot;
use crate::projector::Projector;
use crate::segment::SegmentTable;

/// Consecutive non-improving steps tolerated by [`MeshRefiner::lower_epsilon`].
pub const DEFAULT_STALL_LIMIT: u32 = 500;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RefineConfig {
    pub stall_limit: u32,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            stall_limit: DEFAULT_STALL_LIMIT,
        }
    }
}

/// How a call to [`MeshRefiner::lower_epsilon`] ended.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum LowerOutcome {
    /// The largest queued epsilon is below the target (or zero).
    Reached { epsilon: f64, steps: u64 },
    /// The largest queued epsilon stopped shrinking; the mesh is valid but
    /// coarser than requested.
    Stalled { epsilon: f64, steps: u64 },
    /// Nothing left in the queue to split.
    Exhausted { steps: u64 },
}

impl LowerOutcome {
    pub fn steps(&self) -> u64 {
        match *self {
            LowerOutcome::Reached { steps, .. }
            | LowerOutcome::Stalled { steps, .. }
            | LowerOutcome::Exhausted { steps } => steps,
        }
    }
}

/// Queue entry for a segment that has not been split yet.
///
/// `midpoint` and `projected_mid` duplicate what the segment's endpoints
/// would yield; they are cached so a split never calls the projector again.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Candidate {
    pub segment: Handle,
    pub v1: VertexId,
    pub v2: VertexId,
    pub epsilon: f64,
    pub midpoint: Vec2,
    pub projected_mid: Vec2,
}

/// Incrementally subdivides a planar triangle mesh so that a piecewise
/// linear mesh tracks a non-linear projector.
///
/// Vertices and triangles are append-only; a split rewrites one triangle in
/// place and appends its other half.
#[derive(Debug)]
pub struct MeshRefiner<P> {
    projector: P,
    config: RefineConfig,
    pub(crate) unprojected: Vec<Vec2>,
    pub(crate) projected: Vec<Vec2>,
    pub(crate) uv: Vec<Vec2>,
    pub(crate) triangles: Vec<[VertexId; 3]>,
    /// Orientation sign each triangle must keep (0 for degenerate seeds).
    pub(crate) winding: Vec<f64>,
    pub(crate) segments: SegmentTable,
    queue: WorkQueue<StableF64, Candidate>,
    metrics: Metrics,
}

impl<P: Projector> MeshRefiner<P> {
    pub fn new(
        projector: P,
        vertices: &[[f64; 2]],
        uv: &[[f64; 2]],
        triangles: &[[u32; 3]],
    ) -> Result<Self, MeshError> {
        Self::with_config(projector, vertices, uv, triangles, RefineConfig::default())
    }

    pub fn with_config(
        projector: P,
        vertices: &[[f64; 2]],
        uv: &[[f64; 2]],
        triangles: &[[u32; 3]],
        config: RefineConfig,
    ) -> Result<Self, MeshError> {
        if uv.len() != vertices.len() {
            return Err(InputError::UvCountMismatch {
                vertices: vertices.len(),
                uv: uv.len(),
            }
            .into());
        }
        if u32::try_from(vertices.len()).is_err() {
            return Err(MeshError::CapacityExceeded { what: "vertices" });
        }
        if u32::try_from(triangles.len()).is_err() {
            return Err(MeshError::CapacityExceeded { what: "triangles" });
        }
        for (i, tri) in triangles.iter().enumerate() {
            if let Some(&vertex) = tri.iter().find(|&&v| v as usize >= vertices.len()) {
                return Err(InputError::VertexOutOfRange {
                    triangle: i,
                    vertex,
                    vertex_count: vertices.len(),
                }
                .into());
            }
            if tri[0] == tri[1] || tri[1] == tri[2] || tri[2] == tri[0] {
                return Err(InputError::DegenerateTriangle { triangle: i }.into());
            }
        }

        let unprojected: Vec<Vec2> = vertices.iter().copied().map(Vec2::from).collect();
        let projected = unprojected.iter().map(|&p| projector.project(p)).collect();
        let triangles: Vec<[VertexId; 3]> = triangles
            .iter()
            .map(|t| [VertexId(t[0]), VertexId(t[1]), VertexId(t[2])])
            .collect();
        let winding = triangles
            .iter()
            .map(|t| {
                let area = orient2d(
                    unprojected[t[0].index()],
                    unprojected[t[1].index()],
                    unprojected[t[2].index()],
                );
                if area == 0.0 || !area.is_finite() {
                    0.0
                } else {
                    area.signum()
                }
            })
            .collect();

        let mut refiner = Self {
            projector,
            config,
            unprojected,
            projected,
            uv: uv.iter().copied().map(Vec2::from).collect(),
            triangles,
            winding,
            segments: SegmentTable::default(),
            queue: WorkQueue::new(),
            metrics: Metrics::new(),
        };

        for t in 0..refiner.triangles.len() {
            let [v0, v1, v2] = refiner.triangles[t];
            let t = TriangleId(t as u32);
            refiner.register(v0, v1, t, f64::INFINITY)?;
            refiner.register(v1, v2, t, f64::INFINITY)?;
            refiner.register(v2, v0, t, f64::INFINITY)?;
        }

        if let Some((_, seg)) = refiner.segments.iter().find(|(_, s)| s.triangles.len() > 2) {
            return Err(InputError::NonManifoldEdge {
                v1: seg.v1.0,
                v2: seg.v2.0,
                triangles: seg.triangles.len(),
            }
            .into());
        }

        refiner.sync_gauges();
        debug!(
            vertices = refiner.vertex_count(),
            triangles = refiner.triangle_count(),
            segments = refiner.segments.len(),
            queued = refiner.queue.len(),
            "seed mesh registered"
        );
        Ok(refiner)
    }

    /// Largest epsilon still waiting in the queue, `None` once it is empty.
    pub fn epsilon(&self) -> Option<f64> {
        self.queue.peek().map(|(epsilon, _)| epsilon.get())
    }

    /// Same as [`lower_epsilon`](Self::lower_epsilon).
    pub fn set_epsilon(&mut self, target: f64) -> Result<LowerOutcome, MeshError> {
        self.lower_epsilon(target)
    }

    /// Splits the segment with the largest epsilon.
    ///
    /// New sub-segments whose epsilon is not below the split segment's are
    /// kept in the mesh but never queued. Returns `false` when the queue is
    /// empty.
    pub fn step(&mut self) -> Result<bool, MeshError> {
        while let Some((_, _, candidate)) = self.queue.pop_next() {
            if self.split(candidate, candidate.epsilon)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Steps until the budget runs out or the queue is empty, charging one
    /// unit per popped segment. Returns the number of splits.
    pub fn step_with_budget(&mut self, budget: &mut FrameBudget) -> Result<u64, MeshError> {
        let mut splits = 0;
        while let Some((_, _, candidate)) = self.queue.pop_next_with_budget(budget) {
            if self.split(candidate, candidate.epsilon)? {
                splits += 1;
            }
        }
        Ok(splits)
    }

    /// Splits every currently queued segment once.
    ///
    /// The queue is drained up front; segments created by this pass are
    /// queued without an epsilon cap and left for later steps.
    pub fn force(&mut self) -> Result<u64, MeshError> {
        let frontier = self.queue.drain_ordered();
        let drained = frontier.len();
        let mut splits = 0;
        for (_, _, candidate) in frontier {
            if self.split(candidate, f64::INFINITY)? {
                splits += 1;
            }
        }
        self.metrics.inc("refine.force_passes");
        debug!(drained, splits, queued = self.queue.len(), "force pass complete");
        Ok(splits)
    }

    /// Steps until the largest queued epsilon is below `target`.
    ///
    /// `target` is in squared destination units and must be finite. Gives
    /// up after `stall_limit` consecutive steps that fail to shrink the
    /// maximum; any improving step resets that count.
    pub fn lower_epsilon(&mut self, target: f64) -> Result<LowerOutcome, MeshError> {
        if !target.is_finite() {
            return Err(InputError::NonFiniteTarget.into());
        }
        let Some(mut current) = self.epsilon() else {
            return Ok(LowerOutcome::Exhausted { steps: 0 });
        };
        let mut last = current;
        let mut stalled = 0u32;
        let mut steps = 0u64;

        // A zero epsilon means the remaining edges are already exact.
        while current >= target && current > 0.0 {
            if !self.step()? {
                return Ok(LowerOutcome::Exhausted { steps });
            }
            steps += 1;

            let Some(next) = self.epsilon() else {
                return Ok(LowerOutcome::Exhausted { steps });
            };
            current = next;

            if current >= last {
                stalled += 1;
                if stalled >= self.config.stall_limit {
                    self.metrics.inc("refine.stalls");
                    warn!(
                        epsilon = current,
                        target,
                        steps,
                        "refinement stopped due to epsilon stall; raster may need hints"
                    );
                    return Ok(LowerOutcome::Stalled {
                        epsilon: current,
                        steps,
                    });
                }
            } else {
                stalled = 0;
                last = current;
            }
        }

        debug!(epsilon = current, target, steps, "target epsilon reached");
        Ok(LowerOutcome::Reached {
            epsilon: current,
            steps,
        })
    }

    /// Returns the segment linking `v1` and `v2`, creating and possibly
    /// queueing it if this is the first triangle to use the edge.
    fn register(
        &mut self,
        v1: VertexId,
        v2: VertexId,
        t: TriangleId,
        max_epsilon: f64,
    ) -> Result<Handle, MeshError> {
        if let Some(h) = self.segments.attach(v1, v2, t) {
            return Ok(h);
        }

        let segment = self
            .segments
            .insert(v1, v2, t)
            .ok_or(MeshError::CapacityExceeded { what: "segments" })?;
        self.metrics.inc("refine.segments_created");

        // Epsilon: squared distance between the projected midpoint and the
        // midpoint of the projected endpoints.
        let midpoint = self.unprojected[v1.index()].midpoint(self.unprojected[v2.index()]);
        let projected_mid = self.projector.project(midpoint);
        let mid_projected = self.projected[v1.index()].midpoint(self.projected[v2.index()]);
        let epsilon = projected_mid.distance_squared(mid_projected);

        if !epsilon.is_finite() {
            self.metrics.inc("refine.segments_non_finite");
        } else if epsilon < max_epsilon {
            self.queue.push(
                StableF64(epsilon),
                Candidate {
                    segment,
                    v1,
                    v2,
                    epsilon,
                    midpoint,
                    projected_mid,
                },
            );
        } else {
            self.metrics.inc("refine.segments_capped");
        }
        Ok(segment)
    }

    /// Deletes the candidate's segment, adds its midpoint vertex and halves
    /// each triangle that used it. Returns `false` for a stale candidate.
    fn split(&mut self, candidate: Candidate, max_epsilon: f64) -> Result<bool, MeshError> {
        let Candidate {
            segment,
            v1,
            v2,
            midpoint,
            projected_mid,
            ..
        } = candidate;

        if self.segments.lookup(v1, v2) != Some(segment) {
            self.metrics.inc("refine.stale_candidates");
            trace!(v1 = v1.0, v2 = v2.0, "skipping stale candidate");
            return Ok(false);
        }
        let attached = self.segments.get(segment).map_or(0, |s| s.triangles.len());
        if attached > 2 {
            return Err(CorruptionError::SegmentOverShared {
                v1: v1.0,
                v2: v2.0,
                triangles: attached,
            }
            .into());
        }
        if attached == 0 {
            return Err(CorruptionError::OrphanSegment { v1: v1.0, v2: v2.0 }.into());
        }
        let Some(removed) = self.segments.remove(segment) else {
            return Err(CorruptionError::MissingSegment { v1: v1.0, v2: v2.0 }.into());
        };

        let uv = self.uv[v1.index()].midpoint(self.uv[v2.index()]);
        let vm = self.push_vertex(midpoint, projected_mid, uv)?;

        for &t in &removed.triangles {
            self.split_triangle(v1, v2, vm, t, max_epsilon)?;
        }

        self.metrics.inc("refine.splits");
        self.metrics
            .record_histogram("refine.split_fanout", removed.triangles.len() as i64);
        self.sync_gauges();
        trace!(
            v1 = v1.0,
            v2 = v2.0,
            vm = vm.0,
            epsilon = candidate.epsilon,
            triangles = removed.triangles.len(),
            "split segment"
        );
        Ok(true)
    }

    fn split_triangle(
        &mut self,
        v1: VertexId,
        v2: VertexId,
        vm: VertexId,
        t: TriangleId,
        max_epsilon: f64,
    ) -> Result<(), MeshError> {
        let Some(&tri) = self.triangles.get(t.index()) else {
            return Err(CorruptionError::MissingTriangle { triangle: t.0 }.into());
        };
        let (v3, forward) = third_vertex(tri, v1, v2).ok_or(CorruptionError::WindingMismatch {
            triangle: t.0,
            v1: v1.0,
            v2: v2.0,
        })?;

        let t2 = u32::try_from(self.triangles.len())
            .map(TriangleId)
            .map_err(|_| MeshError::CapacityExceeded { what: "triangles" })?;

        // The first half keeps the parent's index, the second is appended.
        let (first, second) = if forward {
            ([v1, vm, v3], [vm, v2, v3])
        } else {
            ([vm, v1, v3], [v2, vm, v3])
        };
        self.triangles[t.index()] = first;
        self.triangles.push(second);
        let winding = self.winding[t.index()];
        self.winding.push(winding);

        // The v1-v2 segment is already gone.
        self.segments.detach(v2, v3, t);
        self.segments.detach(v3, v1, t);

        self.register(v1, vm, t, max_epsilon)?;
        self.register(vm, v3, t, max_epsilon)?;
        self.register(v3, v1, t, max_epsilon)?;

        self.register(v2, vm, t2, max_epsilon)?;
        self.register(vm, v3, t2, max_epsilon)?;
        self.register(v3, v2, t2, max_epsilon)?;

        self.metrics.inc("refine.triangles_split");
        Ok(())
    }

    fn push_vertex(
        &mut self,
        unprojected: Vec2,
        projected: Vec2,
        uv: Vec2,
    ) -> Result<VertexId, MeshError> {
        let id = u32::try_from(self.unprojected.len())
            .map_err(|_| MeshError::CapacityExceeded { what: "vertices" })?;
        self.unprojected.push(unprojected);
        self.projected.push(projected);
        self.uv.push(uv);
        Ok(VertexId(id))
    }
}

impl<P> MeshRefiner<P> {
    pub fn config(&self) -> RefineConfig {
        self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn vertex_count(&self) -> usize {
        self.unprojected.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Number of segments still eligible for splitting.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Copies out the current mesh.
    pub fn output(&self) -> MeshSnapshot {
        MeshSnapshot {
            unprojected: self.unprojected.iter().map(|v| v.as_array()).collect(),
            projected: self.projected.iter().map(|v| v.as_array()).collect(),
            uv: self.uv.iter().map(|v| v.as_array()).collect(),
            triangles: self
                .triangles
                .iter()
                .map(|t| [t[0].0, t[1].0, t[2].0])
                .collect(),
        }
    }

    fn sync_gauges(&mut self) {
        self.metrics
            .set_gauge("mesh.vertices", self.unprojected.len() as i64);
        self.metrics
            .set_gauge("mesh.triangles", self.triangles.len() as i64);
        self.metrics
            .set_gauge("mesh.segments", self.segments.len() as i64);
        self.metrics.set_gauge("refine.queued", self.queue.len() as i64);
    }
}

/// Finds the vertex of `tri` opposite the v1-v2 edge and whether the
/// triangle runs v1 -> v2 (`true`) or v2 -> v1 (`false`).
fn third_vertex(tri: [VertexId; 3], v1: VertexId, v2: VertexId) -> Option<(VertexId, bool)> {
    let [a, b, c] = tri;
    let edge = (v1, v2);
    if (a, b) == edge {
        Some((c, true))
    } else if (b, c) == edge {
        Some((a, true))
    } else if (c, a) == edge {
        Some((b, true))
    } else if (b, a) == edge {
        Some((c, false))
    } else if (c, b) == edge {
        Some((a, false))
    } else if (a, c) == edge {
        Some((b, false))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_STALL_LIMIT, LowerOutcome, MeshRefiner, RefineConfig};
    use crate::{Identity, InputError, MeshError, Projector};
    use foundation::math::Vec2;
    use pretty_assertions::assert_eq;
    use runtime::FrameBudget;

    const SQUARE: [[f64; 2]; 4] = [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
    const SQUARE_TRIS: [[u32; 3]; 2] = [[0, 1, 3], [0, 3, 2]];

    fn assert_close(a: f64, b: f64, eps: f64) {
        assert!((a - b).abs() <= eps, "{a} vs {b} (eps {eps})");
    }

    /// Straight in x, quadratic shear in y: horizontal edges carry all the
    /// error and each halving divides it by 16.
    fn bent(p: [f64; 2]) -> [f64; 2] {
        [p[0], p[1] + p[0] * p[0]]
    }

    /// Mostly identity with a sharp bump near (1, 1).
    fn bump(p: [f64; 2]) -> [f64; 2] {
        let d2 = (p[0] - 1.0).powi(2) + (p[1] - 1.0).powi(2);
        let g = 0.5 * (-d2 / 0.02).exp();
        [p[0] + g, p[1] + g]
    }

    fn square<P: Projector>(projector: P) -> MeshRefiner<P> {
        MeshRefiner::new(projector, &SQUARE, &SQUARE, &SQUARE_TRIS).unwrap()
    }

    #[test]
    fn seed_registers_every_edge_once() {
        let r = square(bent);
        assert_eq!(r.vertex_count(), 4);
        assert_eq!(r.triangle_count(), 2);
        assert_eq!(r.segment_count(), 5);
        assert_eq!(r.queued(), 5);
        assert_eq!(r.epsilon(), Some(0.0625));
        assert_eq!(r.metrics().counter("refine.segments_created"), 5);
        assert_eq!(r.metrics().gauge("mesh.segments"), Some(5));
    }

    #[test]
    fn rejects_malformed_seeds() {
        let err = MeshRefiner::new(Identity, &SQUARE, &SQUARE[..3], &SQUARE_TRIS).unwrap_err();
        assert_eq!(
            err,
            MeshError::Input(InputError::UvCountMismatch { vertices: 4, uv: 3 })
        );

        let err = MeshRefiner::new(Identity, &SQUARE, &SQUARE, &[[0, 1, 4]]).unwrap_err();
        assert_eq!(
            err,
            MeshError::Input(InputError::VertexOutOfRange {
                triangle: 0,
                vertex: 4,
                vertex_count: 4
            })
        );

        let err = MeshRefiner::new(Identity, &SQUARE, &SQUARE, &[[0, 1, 1]]).unwrap_err();
        assert_eq!(
            err,
            MeshError::Input(InputError::DegenerateTriangle { triangle: 0 })
        );
    }

    #[test]
    fn rejects_edge_shared_by_three_triangles() {
        let verts = [[0.0, 0.0], [1.0, 0.0], [0.5, 1.0], [0.5, -1.0], [2.0, 2.0]];
        let tris = [[0, 1, 2], [1, 0, 3], [0, 1, 4]];
        let err = MeshRefiner::new(Identity, &verts, &verts, &tris).unwrap_err();
        assert_eq!(
            err,
            MeshError::Input(InputError::NonManifoldEdge {
                v1: 0,
                v2: 1,
                triangles: 3
            })
        );
        assert!(!err.is_internal());
    }

    #[test]
    fn empty_seed_has_nothing_to_do() {
        let mut r = MeshRefiner::new(Identity, &[], &[], &[]).unwrap();
        assert_eq!(r.epsilon(), None);
        assert!(!r.step().unwrap());
        assert_eq!(r.force().unwrap(), 0);
        assert_eq!(
            r.lower_epsilon(1e-6).unwrap(),
            LowerOutcome::Exhausted { steps: 0 }
        );
    }

    #[test]
    fn first_step_splits_oldest_worst_edge() {
        let mut r = square(bent);
        assert!(r.step().unwrap());

        let out = r.output();
        assert_eq!(out.triangles, vec![[1, 4, 0], [0, 3, 2], [4, 3, 0]]);
        assert_eq!(out.unprojected[4], [0.5, 1.0]);
        assert_eq!(out.projected[4], [0.5, 1.25]);
        assert_eq!(out.uv[4], [0.5, 1.0]);
        assert_eq!(r.segment_count(), 7);
        assert_eq!(r.queued(), 7);
        assert_eq!(r.epsilon(), Some(0.0625));
        assert_eq!(r.validate(), Ok(()));
    }

    #[test]
    fn midpoint_uv_is_average_of_endpoints() {
        let uv = [[0.2, 0.4], [0.2, 0.8], [0.6, 0.4], [0.6, 0.8]];
        let mut r = MeshRefiner::new(bent, &SQUARE, &uv, &SQUARE_TRIS).unwrap();
        r.force().unwrap();
        let out = r.output();
        // Vertex 4 is the 1-3 midpoint, 5 the 0-3 midpoint, 6 the 0-2 midpoint.
        let expected = [[0.4, 0.8], [0.4, 0.6], [0.4, 0.4]];
        for (got, want) in out.uv[4..7].iter().zip(expected) {
            assert_close(got[0], want[0], 1e-12);
            assert_close(got[1], want[1], 1e-12);
        }
    }

    #[test]
    fn identity_mesh_has_zero_error() {
        let mut r = square(Identity);
        assert_eq!(r.epsilon(), Some(0.0));
        assert_eq!(
            r.lower_epsilon(1e-6).unwrap(),
            LowerOutcome::Reached {
                epsilon: 0.0,
                steps: 0
            }
        );

        assert_eq!(r.force().unwrap(), 5);
        assert_eq!(r.vertex_count(), 9);
        assert_eq!(r.triangle_count(), 8);
        assert_eq!(r.epsilon(), Some(0.0));
        for _ in 0..10 {
            assert!(r.step().unwrap());
            assert_eq!(r.epsilon(), Some(0.0));
        }
        assert_eq!(r.validate(), Ok(()));
    }

    #[test]
    fn force_splits_every_queued_edge_once() {
        let mut r = square(bent);
        assert_eq!(r.force().unwrap(), 5);
        assert_eq!(r.vertex_count(), 9);
        assert_eq!(r.triangle_count(), 8);
        assert_eq!(r.segment_count(), 16);
        assert_eq!(r.queued(), 16);
        assert_eq!(r.epsilon(), Some(0.00390625));
        assert_eq!(r.metrics().counter("refine.force_passes"), 1);
        assert_eq!(r.metrics().counter("refine.splits"), 5);
        assert_eq!(r.validate(), Ok(()));
    }

    #[test]
    fn steps_keep_counts_and_structure_consistent() {
        let mut r = square(bump);
        let mut last = r.epsilon().unwrap();
        for k in 1..=200usize {
            assert!(r.step().unwrap());
            assert_eq!(r.vertex_count(), 4 + k);
            let t = r.triangle_count();
            assert!(t >= 2 + k && t <= 2 + 2 * k, "{t} triangles after {k} splits");
            assert_eq!(r.validate(), Ok(()));

            let eps = r.epsilon().unwrap();
            assert!(eps <= last, "max epsilon grew from {last} to {eps}");
            last = eps;
        }
    }

    #[test]
    fn refinement_concentrates_where_projection_bends() {
        let mut r = square(bump);
        r.force().unwrap();
        for _ in 0..60 {
            r.step().unwrap();
        }
        let out = r.output();
        let in_quadrant = |lo: f64, hi: f64| {
            out.unprojected
                .iter()
                .filter(|p| (lo..=hi).contains(&p[0]) && (lo..=hi).contains(&p[1]))
                .count()
        };
        assert_eq!(out.vertex_count(), 69);
        let (near, far) = (in_quadrant(0.5, 1.0), in_quadrant(0.0, 0.5));
        assert!(near > 10 * far, "{near} vertices near the bump, {far} away from it");
    }

    #[test]
    fn lower_epsilon_reaches_target() {
        let mut r = square(bent);
        let outcome = r.lower_epsilon(1e-4).unwrap();
        assert_eq!(
            outcome,
            LowerOutcome::Reached {
                epsilon: 1.52587890625e-5,
                steps: 33
            }
        );
        assert_eq!(r.vertex_count(), 37);
        assert!(r.epsilon().unwrap() < 1e-4);
        assert_eq!(r.validate(), Ok(()));
    }

    #[test]
    fn lower_epsilon_stops_on_stall() {
        let config = RefineConfig { stall_limit: 1 };
        let mut r =
            MeshRefiner::with_config(bent, &SQUARE, &SQUARE, &SQUARE_TRIS, config).unwrap();
        // Three edges tie at 0.0625, so the first split cannot lower the max.
        let outcome = r.lower_epsilon(1e-9).unwrap();
        assert_eq!(
            outcome,
            LowerOutcome::Stalled {
                epsilon: 0.0625,
                steps: 1
            }
        );
        assert_eq!(outcome.steps(), 1);
        assert_eq!(r.vertex_count(), 5);
        assert_eq!(r.metrics().counter("refine.stalls"), 1);
        assert_eq!(r.validate(), Ok(()));
    }

    #[test]
    fn improving_step_resets_stall_count() {
        // bent: two ties at 0.0625, a drop to 1/256, then more ties.
        let config = RefineConfig { stall_limit: 3 };
        let mut r =
            MeshRefiner::with_config(bent, &SQUARE, &SQUARE, &SQUARE_TRIS, config).unwrap();
        let outcome = r.lower_epsilon(1e-9).unwrap();
        assert_eq!(
            outcome,
            LowerOutcome::Stalled {
                epsilon: 0.00390625,
                steps: 6
            }
        );
        assert_eq!(r.vertex_count(), 10);
    }

    #[test]
    fn default_stall_limit_ends_an_unreachable_target() {
        assert_eq!(DEFAULT_STALL_LIMIT, 500);
        assert_eq!(RefineConfig::default().stall_limit, DEFAULT_STALL_LIMIT);

        let mut r = square(bent);
        let outcome = r.lower_epsilon(0.0).unwrap();
        assert_eq!(
            outcome,
            LowerOutcome::Stalled {
                epsilon: 5.960464477539063e-8,
                steps: 773
            }
        );
        assert_eq!(r.vertex_count(), 777);
        assert_eq!(r.metrics().counter("refine.stalls"), 1);
        assert_eq!(r.validate(), Ok(()));
    }

    #[test]
    fn non_finite_target_is_rejected() {
        let mut r = square(bent);
        for target in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(
                r.lower_epsilon(target),
                Err(MeshError::Input(InputError::NonFiniteTarget))
            );
        }
        assert_eq!(r.vertex_count(), 4);
        assert_eq!(r.epsilon(), Some(0.0625));
    }

    #[test]
    fn non_finite_edges_are_never_queued() {
        let poison = |p: [f64; 2]| {
            if p[0] > 0.9 && p[1] > 0.9 {
                [f64::NAN, 0.0]
            } else {
                bent(p)
            }
        };
        let mut r = MeshRefiner::new(poison, &SQUARE, &SQUARE, &SQUARE_TRIS).unwrap();
        assert_eq!(r.segment_count(), 5);
        assert_eq!(r.queued(), 2);
        assert_eq!(r.epsilon(), Some(0.0625));
        assert_eq!(r.metrics().counter("refine.segments_non_finite"), 3);

        r.force().unwrap();
        assert!(r.output().projected[3][0].is_nan());
        assert_eq!(r.validate(), Ok(()));
    }

    #[test]
    fn budget_limits_splits() {
        let mut r = square(bump);
        let mut budget = FrameBudget::new(7);
        assert_eq!(r.step_with_budget(&mut budget).unwrap(), 7);
        assert!(budget.is_exhausted());
        assert_eq!(r.vertex_count(), 11);
        assert_eq!(r.step_with_budget(&mut budget).unwrap(), 0);
    }

    #[test]
    fn identical_runs_produce_identical_meshes() {
        let run = || {
            let mut r = square(bump);
            r.force().unwrap();
            for _ in 0..40 {
                r.step().unwrap();
            }
            (r.output(), r.metrics().snapshot())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn closures_and_boxed_projectors_work() {
        let offset = Vec2::new(2.0, -1.0);
        let shift = move |p: [f64; 2]| [p[0] + offset.x, p[1] + offset.y];
        let boxed: Box<dyn Fn([f64; 2]) -> [f64; 2]> = Box::new(shift);
        let r = MeshRefiner::new(boxed, &SQUARE, &SQUARE, &SQUARE_TRIS).unwrap();
        assert_eq!(r.output().projected[3], [3.0, 0.0]);
        assert_eq!(r.epsilon(), Some(0.0));
    }
}
