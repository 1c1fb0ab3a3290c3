use foundation::Aabb2;
use serde::{Deserialize, Serialize};

/// Copy of the refiner's arrays at one point in time.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct MeshSnapshot {
    pub unprojected: Vec<[f64; 2]>,
    pub projected: Vec<[f64; 2]>,
    pub uv: Vec<[f64; 2]>,
    pub triangles: Vec<[u32; 3]>,
}

/// Renderer-ready arrays: two floats per vertex for positions and uv, three
/// indices per triangle.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatMesh {
    #[serde(rename = "pos")]
    pub positions: Vec<f64>,
    pub uv: Vec<f64>,
    #[serde(rename = "trigs")]
    pub indices: Vec<u32>,
}

impl MeshSnapshot {
    pub fn vertex_count(&self) -> usize {
        self.projected.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn flatten(&self) -> FlatMesh {
        FlatMesh {
            positions: self.projected.iter().flatten().copied().collect(),
            uv: self.uv.iter().flatten().copied().collect(),
            indices: self.triangles.iter().flatten().copied().collect(),
        }
    }

    /// Destination-space extent of the mesh, ignoring non-finite vertices.
    pub fn projected_bounds(&self) -> Option<Aabb2> {
        Aabb2::from_points(self.projected.iter().copied())
    }
}

impl FlatMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 2
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn position(&self, vertex: usize) -> Option<[f64; 2]> {
        let xy = self.positions.get(vertex * 2..vertex * 2 + 2)?;
        Some([xy[0], xy[1]])
    }
}
