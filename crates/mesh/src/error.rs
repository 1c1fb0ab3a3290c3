use std::fmt;

/// Problems with a seed mesh handed to [`MeshRefiner`](crate::MeshRefiner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    UvCountMismatch { vertices: usize, uv: usize },
    VertexOutOfRange {
        triangle: usize,
        vertex: u32,
        vertex_count: usize,
    },
    /// A triangle names the same vertex twice.
    DegenerateTriangle { triangle: usize },
    /// More than two seed triangles share one edge.
    NonManifoldEdge { v1: u32, v2: u32, triangles: usize },
    /// Target epsilon passed to `lower_epsilon` is NaN or infinite.
    NonFiniteTarget,
}

/// Internal bookkeeping went wrong. These indicate a bug, never bad input,
/// and must not be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorruptionError {
    SegmentOverShared { v1: u32, v2: u32, triangles: usize },
    OrphanSegment { v1: u32, v2: u32 },
    /// A triangle attached to a segment does not contain that segment's edge.
    WindingMismatch { triangle: u32, v1: u32, v2: u32 },
    MissingSegment { v1: u32, v2: u32 },
    MissingTriangle { triangle: u32 },
    DetachedTriangle { triangle: u32, v1: u32, v2: u32 },
    OrientationFlip { triangle: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    Input(InputError),
    Corrupt(CorruptionError),
    /// More vertices, triangles or segments than 32-bit indices can address.
    CapacityExceeded { what: &'static str },
}

impl MeshError {
    /// True for invariant violations inside the refiner.
    pub fn is_internal(&self) -> bool {
        matches!(self, MeshError::Corrupt(_))
    }
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::UvCountMismatch { vertices, uv } => {
                write!(f, "{uv} uv coordinates for {vertices} vertices")
            }
            InputError::VertexOutOfRange {
                triangle,
                vertex,
                vertex_count,
            } => write!(
                f,
                "triangle {triangle} references vertex {vertex} but only {vertex_count} exist"
            ),
            InputError::DegenerateTriangle { triangle } => {
                write!(f, "triangle {triangle} repeats a vertex")
            }
            InputError::NonManifoldEdge { v1, v2, triangles } => {
                write!(f, "edge {v1}-{v2} is shared by {triangles} triangles")
            }
            InputError::NonFiniteTarget => write!(f, "target epsilon must be finite"),
        }
    }
}

impl fmt::Display for CorruptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorruptionError::SegmentOverShared { v1, v2, triangles } => {
                write!(f, "segment {v1}-{v2} is shared by {triangles} triangles")
            }
            CorruptionError::OrphanSegment { v1, v2 } => {
                write!(f, "segment {v1}-{v2} has no triangles")
            }
            CorruptionError::WindingMismatch { triangle, v1, v2 } => write!(
                f,
                "could not find third vertex of triangle {triangle} for edge {v1}-{v2}"
            ),
            CorruptionError::MissingSegment { v1, v2 } => {
                write!(f, "no segment registered for edge {v1}-{v2}")
            }
            CorruptionError::MissingTriangle { triangle } => {
                write!(f, "triangle {triangle} does not exist")
            }
            CorruptionError::DetachedTriangle { triangle, v1, v2 } => write!(
                f,
                "segment {v1}-{v2} and triangle {triangle} disagree about adjacency"
            ),
            CorruptionError::OrientationFlip { triangle } => {
                write!(f, "triangle {triangle} flipped orientation")
            }
        }
    }
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshError::Input(err) => write!(f, "invalid seed mesh: {err}"),
            MeshError::Corrupt(err) => write!(f, "mesh invariant violated: {err}"),
            MeshError::CapacityExceeded { what } => write!(f, "too many {what} for 32-bit indices"),
        }
    }
}

impl std::error::Error for InputError {}
impl std::error::Error for CorruptionError {}

impl std::error::Error for MeshError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MeshError::Input(err) => Some(err),
            MeshError::Corrupt(err) => Some(err),
            MeshError::CapacityExceeded { .. } => None,
        }
    }
}

impl From<InputError> for MeshError {
    fn from(err: InputError) -> Self {
        MeshError::Input(err)
    }
}

impl From<CorruptionError> for MeshError {
    fn from(err: CorruptionError) -> Self {
        MeshError::Corrupt(err)
    }
}
