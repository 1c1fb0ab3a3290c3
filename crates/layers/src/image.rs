//! Georeferenced image layers.
//!
//! An image is described by its four corners in some source projection. The
//! layer turns that quad into a triangle mesh on the host's normalized
//! Web-Mercator surface, refined so that straight mesh edges follow the
//! curvature of the reprojection.

use std::fmt;

use foundation::math::{
    CoordinateSystem, MercatorSurface, ProjectionError, ProjectionRegistry, SourceProjection,
    Vec2,
};
use mesh::{FlatMesh, MeshError, MeshRefiner, Projector};
use runtime::FrameBudget;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::layer::{Layer, LayerId};
use crate::symbology::{LayerStyle, Resampling};

pub const DEFAULT_ARRUGATOR_STEP: u32 = 100;
pub const DEFAULT_CROSS_ORIGIN: &str = "anonymous";

/// Largest vertex count a renderer using 16-bit indices can draw.
const U16_INDEX_LIMIT: usize = u16::MAX as usize + 1;

/// Image corners in source coordinates: top-left, top-right, bottom-right,
/// bottom-left.
pub type Corners = [[f64; 2]; 4];

/// Texture coordinates of the seed vertices, in seed order.
pub const SEED_UV: [[f64; 2]; 4] = [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];

/// Two triangles covering the seed quad, sharing the TL-BR diagonal.
pub const SEED_TRIANGLES: [[u32; 3]; 2] = [[0, 1, 3], [0, 3, 2]];

/// Reorders corners into seed order: top-left, bottom-left, top-right,
/// bottom-right.
pub fn seed_vertices(corners: &Corners) -> [[f64; 2]; 4] {
    [corners[0], corners[3], corners[1], corners[2]]
}

/// How far to refine the seed quad.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum RefinePolicy {
    /// One forced pass then this many steps. Zero keeps the bare quad.
    Steps(u32),
    /// One forced pass then step until the largest error (squared surface
    /// units) drops below the target.
    Epsilon(f64),
}

fn default_opacity() -> f64 {
    1.0
}

fn default_cross_origin() -> String {
    DEFAULT_CROSS_ORIGIN.to_string()
}

fn default_step() -> u32 {
    DEFAULT_ARRUGATOR_STEP
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageOption {
    pub url: String,
    /// Source projection: a code such as `EPSG:4326`, a code registered in
    /// the layer's [`ProjectionRegistry`], or a raw proj string.
    pub projection: String,
    pub coordinates: Corners,
    #[serde(default)]
    pub resampling: Resampling,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default = "default_cross_origin")]
    pub cross_origin: String,
    #[serde(default = "default_step")]
    pub arrugator_step: u32,
    /// Overrides `arrugator_step` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_epsilon: Option<f64>,
}

impl ImageOption {
    pub fn new(url: impl Into<String>, projection: impl Into<String>, coordinates: Corners) -> Self {
        Self {
            url: url.into(),
            projection: projection.into(),
            coordinates,
            resampling: Resampling::default(),
            opacity: default_opacity(),
            cross_origin: default_cross_origin(),
            arrugator_step: DEFAULT_ARRUGATOR_STEP,
            target_epsilon: None,
        }
    }

    pub fn policy(&self) -> RefinePolicy {
        match self.target_epsilon {
            Some(target) => RefinePolicy::Epsilon(target),
            None => RefinePolicy::Steps(self.arrugator_step),
        }
    }
}

/// Partial changes for [`ImageLayer::update_image`]; `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageUpdate {
    pub url: Option<String>,
    pub projection: Option<String>,
    pub coordinates: Option<Corners>,
    pub opacity: Option<f64>,
    pub resampling: Option<Resampling>,
}

/// What the renderer has to redo after an update.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ImageUpdateEffect {
    /// Vertex buffers changed.
    pub remeshed: bool,
    /// The texture has to be fetched or re-filtered.
    pub reload_texture: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageLayerError {
    Projection(ProjectionError),
    Mesh(MeshError),
}

impl fmt::Display for ImageLayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageLayerError::Projection(err) => write!(f, "{err}"),
            ImageLayerError::Mesh(err) => write!(f, "failed to build image mesh: {err}"),
        }
    }
}

impl std::error::Error for ImageLayerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImageLayerError::Projection(err) => Some(err),
            ImageLayerError::Mesh(err) => Some(err),
        }
    }
}

impl From<ProjectionError> for ImageLayerError {
    fn from(err: ProjectionError) -> Self {
        ImageLayerError::Projection(err)
    }
}

impl From<MeshError> for ImageLayerError {
    fn from(err: MeshError) -> Self {
        ImageLayerError::Mesh(err)
    }
}

/// Maps source coordinates onto the host's `[0, 1]` mercator surface.
pub fn surface_projector(
    source: SourceProjection,
) -> impl Fn([f64; 2]) -> [f64; 2] + Clone + Send + Sync {
    let surface = MercatorSurface::new(source);
    move |p| surface.to_screen(Vec2::from(p)).as_array()
}

/// Seeds a refiner with the image quad and refines it according to `policy`.
pub fn warp_quad<P: Projector>(
    projector: P,
    corners: &Corners,
    policy: RefinePolicy,
) -> Result<MeshRefiner<P>, MeshError> {
    let seed = seed_vertices(corners);
    let mut refiner = MeshRefiner::new(projector, &seed, &SEED_UV, &SEED_TRIANGLES)?;
    match policy {
        RefinePolicy::Steps(0) => {}
        RefinePolicy::Steps(steps) => {
            refiner.force()?;
            refiner.step_with_budget(&mut FrameBudget::new(steps))?;
        }
        RefinePolicy::Epsilon(target) => {
            refiner.force()?;
            refiner.lower_epsilon(target)?;
        }
    }
    Ok(refiner)
}

type BoxedProjector = Box<dyn Fn([f64; 2]) -> [f64; 2] + Send + Sync>;

/// A reprojected image ready to be uploaded: options, style and mesh.
pub struct ImageLayer {
    id: LayerId,
    option: ImageOption,
    style: LayerStyle,
    registry: ProjectionRegistry,
    projector: BoxedProjector,
    mesh: FlatMesh,
    epsilon: Option<f64>,
}

impl fmt::Debug for ImageLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageLayer")
            .field("id", &self.id)
            .field("option", &self.option)
            .field("style", &self.style)
            .field("vertices", &self.mesh.vertex_count())
            .field("triangles", &self.mesh.triangle_count())
            .field("epsilon", &self.epsilon)
            .finish_non_exhaustive()
    }
}

impl ImageLayer {
    /// Builds a layer for a built-in projection code or a raw proj string.
    pub fn new(id: impl Into<String>, option: ImageOption) -> Result<Self, ImageLayerError> {
        Self::with_registry(id, option, ProjectionRegistry::new())
    }

    /// Like [`ImageLayer::new`], also resolving codes defined in `registry`.
    /// The registry is kept for later projection updates.
    pub fn with_registry(
        id: impl Into<String>,
        option: ImageOption,
        registry: ProjectionRegistry,
    ) -> Result<Self, ImageLayerError> {
        let source = registry.resolve(&option.projection)?;
        let mut layer = Self::with_projector(id, option, surface_projector(source))?;
        layer.registry = registry;
        Ok(layer)
    }

    /// Builds a layer whose corners are mapped by `projector` instead of a
    /// named projection. The projector must already output surface
    /// coordinates; `option.projection` is kept only as a label.
    pub fn with_projector<F>(
        id: impl Into<String>,
        mut option: ImageOption,
        projector: F,
    ) -> Result<Self, ImageLayerError>
    where
        F: Fn([f64; 2]) -> [f64; 2] + Send + Sync + 'static,
    {
        let id = LayerId::new(id);
        let style = LayerStyle::new(option.opacity, option.resampling);
        option.opacity = style.opacity();
        let (mesh, epsilon) = build_mesh(
            &id,
            &option.projection,
            &projector,
            &option.coordinates,
            option.policy(),
        )?;
        Ok(Self {
            id,
            option,
            style,
            registry: ProjectionRegistry::new(),
            projector: Box::new(projector),
            mesh,
            epsilon,
        })
    }

    pub fn option(&self) -> &ImageOption {
        &self.option
    }

    /// Renderer arrays for the current corners and projection.
    pub fn mesh(&self) -> &FlatMesh {
        &self.mesh
    }

    /// Largest edge error left in the mesh, `None` if nothing could be refined.
    pub fn epsilon(&self) -> Option<f64> {
        self.epsilon
    }

    /// Applies a partial update.
    ///
    /// The new mesh is built before anything is committed, so a bad
    /// projection or a failed refinement leaves the layer as it was.
    pub fn update_image(
        &mut self,
        update: ImageUpdate,
    ) -> Result<ImageUpdateEffect, ImageLayerError> {
        let projector = match &update.projection {
            Some(code) => {
                let source = self.registry.resolve(code)?;
                Some(Box::new(surface_projector(source)) as BoxedProjector)
            }
            None => None,
        };

        let remeshed = update.projection.is_some() || update.coordinates.is_some();
        if remeshed {
            let label = update.projection.as_deref().unwrap_or(&self.option.projection);
            let corners = update.coordinates.unwrap_or(self.option.coordinates);
            let (mesh, epsilon) = build_mesh(
                &self.id,
                label,
                projector.as_deref().unwrap_or(self.projector.as_ref()),
                &corners,
                self.option.policy(),
            )?;
            self.mesh = mesh;
            self.epsilon = epsilon;
            self.option.coordinates = corners;
        }
        if let Some(projection) = update.projection {
            self.option.projection = projection;
        }
        if let Some(projector) = projector {
            self.projector = projector;
        }

        if let Some(opacity) = update.opacity {
            self.style.set_opacity(opacity);
            self.option.opacity = self.style.opacity();
        }

        let reload_texture = update.url.is_some() || update.resampling.is_some();
        if let Some(url) = update.url {
            self.option.url = url;
        }
        if let Some(resampling) = update.resampling {
            self.option.resampling = resampling;
            self.style.resampling = resampling;
        }

        Ok(ImageUpdateEffect {
            remeshed,
            reload_texture,
        })
    }
}

/// Refines the image quad and flattens it for upload.
fn build_mesh(
    id: &LayerId,
    projection: &str,
    projector: &(dyn Fn([f64; 2]) -> [f64; 2] + Send + Sync),
    corners: &Corners,
    policy: RefinePolicy,
) -> Result<(FlatMesh, Option<f64>), MeshError> {
    let refiner = warp_quad(projector, corners, policy)?;
    let mesh = refiner.output().flatten();
    let epsilon = refiner.epsilon();

    debug!(
        layer = %id,
        projection,
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        epsilon = ?epsilon,
        "image mesh built"
    );
    if mesh.vertex_count() > U16_INDEX_LIMIT {
        warn!(
            layer = %id,
            vertices = mesh.vertex_count(),
            "image mesh needs 32-bit indices"
        );
    }
    Ok((mesh, epsilon))
}

impl Layer for ImageLayer {
    fn id(&self) -> &LayerId {
        &self.id
    }

    fn style(&self) -> &LayerStyle {
        &self.style
    }
}
