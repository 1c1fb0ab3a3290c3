//! Source projections and the normalized Web-Mercator surface.
//!
//! The host map renders in a square `[0, 1]` space whose origin is the
//! top-left corner of the EPSG:3857 world. Everything here is expressed as
//! pure functions so it can be handed to the mesh refiner as a projector.
//!
//! Geographic and Web-Mercator sources are handled directly. Any other
//! source goes through a proj4 definition: [`proj4rs`] takes it to WGS84
//! longitude/latitude, then the spherical Web-Mercator formulas below take
//! over.

use std::collections::BTreeMap;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use super::{LonLat, Vec2, WGS84_A};

/// Geographic frame that proj4 definitions are reprojected into.
const WGS84_LON_LAT: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// Half the width of the EPSG:3857 plane in meters (`PI * WGS84_A`).
pub const MERCATOR_HALF_EXTENT: f64 = 20_037_508.342_789_244;

/// Spherical Web-Mercator forward transform (degrees to meters).
pub fn lon_lat_to_mercator(p: LonLat) -> Vec2 {
    let x = WGS84_A * p.lon_rad();
    let y = WGS84_A * (FRAC_PI_4 + p.lat_rad() / 2.0).tan().ln();
    Vec2::new(x, y)
}

/// Spherical Web-Mercator inverse transform (meters to degrees).
pub fn mercator_to_lon_lat(p: Vec2) -> LonLat {
    let lon = p.x / WGS84_A;
    let lat = 2.0 * (p.y / WGS84_A).exp().atan() - FRAC_PI_2;
    LonLat::new(lon.to_degrees(), lat.to_degrees())
}

/// Remap EPSG:3857 meters into the host surface's `[0, 1]` space, origin at
/// the top-left of the world.
pub fn mercator_to_unit(p: Vec2) -> Vec2 {
    let span = MERCATOR_HALF_EXTENT * 2.0;
    Vec2::new(
        ((p.x + MERCATOR_HALF_EXTENT) / span).abs(),
        ((p.y - MERCATOR_HALF_EXTENT) / span).abs(),
    )
}

/// Inverse of [`mercator_to_unit`] for points inside the unit square.
pub fn unit_to_mercator(p: Vec2) -> Vec2 {
    let span = MERCATOR_HALF_EXTENT * 2.0;
    Vec2::new(p.x * span - MERCATOR_HALF_EXTENT, MERCATOR_HALF_EXTENT - p.y * span)
}

/// Projections an image's corner coordinates may be expressed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceProjection {
    /// Longitude/latitude in degrees (EPSG:4326 and friends).
    Geographic,
    /// EPSG:3857 meters.
    WebMercator,
    /// Anything else proj4 can describe.
    Proj(Arc<ProjDefinition>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    /// Not a built-in code, not registered and not a proj string.
    Unknown { code: String },
    /// proj4 refused the definition.
    InvalidDefinition { code: String, reason: String },
}

impl fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionError::Unknown { code } => write!(f, "unknown source projection: {code}"),
            ProjectionError::InvalidDefinition { code, reason } => {
                write!(f, "invalid definition for {code}: {reason}")
            }
        }
    }
}

impl std::error::Error for ProjectionError {}

/// A parsed proj4 definition plus the WGS84 frame it is converted through.
pub struct ProjDefinition {
    code: String,
    definition: String,
    /// proj4 takes and returns angles in radians for lon/lat systems.
    angular: bool,
    source: Proj,
    wgs84: Proj,
}

impl ProjDefinition {
    pub fn new(
        code: impl Into<String>,
        definition: impl Into<String>,
    ) -> Result<Self, ProjectionError> {
        let code = code.into();
        let definition = definition.into();
        let invalid = |err: proj4rs::errors::Error| ProjectionError::InvalidDefinition {
            code: code.clone(),
            reason: err.to_string(),
        };
        let source = Proj::from_proj_string(&definition).map_err(invalid)?;
        let wgs84 = Proj::from_proj_string(WGS84_LON_LAT).map_err(invalid)?;
        let angular = definition.split_whitespace().any(|token| {
            matches!(
                token,
                "+proj=longlat" | "+proj=latlong" | "+proj=lonlat" | "+proj=latlon"
            )
        });
        Ok(Self {
            code,
            definition,
            angular,
            source,
            wgs84,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Source coordinates to WGS84 degrees. Points proj4 cannot transform
    /// come back as NaN.
    pub fn to_lon_lat(&self, p: Vec2) -> LonLat {
        let input = if self.angular {
            Vec2::new(p.x.to_radians(), p.y.to_radians())
        } else {
            p
        };
        match reproject(&self.source, &self.wgs84, input) {
            Some(out) => LonLat::new(out.x.to_degrees(), out.y.to_degrees()),
            None => LonLat::new(f64::NAN, f64::NAN),
        }
    }

    /// WGS84 degrees back to source coordinates.
    pub fn from_lon_lat(&self, p: LonLat) -> Vec2 {
        let input = Vec2::new(p.lon_rad(), p.lat_rad());
        match reproject(&self.wgs84, &self.source, input) {
            Some(out) if self.angular => Vec2::new(out.x.to_degrees(), out.y.to_degrees()),
            Some(out) => out,
            None => Vec2::new(f64::NAN, f64::NAN),
        }
    }
}

fn reproject(from: &Proj, to: &Proj, p: Vec2) -> Option<Vec2> {
    let mut point = (p.x, p.y, 0.0);
    transform(from, to, &mut point).ok()?;
    Some(Vec2::new(point.0, point.1))
}

impl fmt::Debug for ProjDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjDefinition")
            .field("code", &self.code)
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ProjDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.definition == other.definition
    }
}

impl Eq for ProjDefinition {}

impl SourceProjection {
    /// Codes handled without proj4.
    fn builtin(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "EPSG:4326" | "WGS84" | "EPSG:4269" => Some(Self::Geographic),
            "EPSG:3857" | "EPSG:900913" | "EPSG:3785" | "EPSG:102113" | "GOOGLE" => {
                Some(Self::WebMercator)
            }
            _ => None,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Geographic => "EPSG:4326",
            Self::WebMercator => "EPSG:3857",
            Self::Proj(def) => def.code(),
        }
    }

    pub fn to_mercator(&self, p: Vec2) -> Vec2 {
        match self {
            Self::Geographic => lon_lat_to_mercator(LonLat::new(p.x, p.y)),
            Self::WebMercator => p,
            Self::Proj(def) => lon_lat_to_mercator(def.to_lon_lat(p)),
        }
    }

    pub fn from_mercator(&self, p: Vec2) -> Vec2 {
        match self {
            Self::Geographic => {
                let ll = mercator_to_lon_lat(p);
                Vec2::new(ll.lon_deg, ll.lat_deg)
            }
            Self::WebMercator => p,
            Self::Proj(def) => def.from_lon_lat(mercator_to_lon_lat(p)),
        }
    }
}

/// Accepts the built-in codes and raw proj strings (`+proj=...`).
impl FromStr for SourceProjection {
    type Err = ProjectionError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        if let Some(builtin) = Self::builtin(code) {
            return Ok(builtin);
        }
        let trimmed = code.trim();
        if trimmed.starts_with('+') {
            let def = ProjDefinition::new(trimmed, trimmed)?;
            return Ok(Self::Proj(Arc::new(def)));
        }
        Err(ProjectionError::Unknown {
            code: code.to_string(),
        })
    }
}

/// Named proj4 definitions, looked up case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionRegistry {
    definitions: BTreeMap<String, String>,
}

impl ProjectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `definition` under `code`, replacing any previous one.
    /// Built-in codes always resolve to their fast paths.
    pub fn define(&mut self, code: &str, definition: impl Into<String>) {
        self.definitions
            .insert(code.trim().to_ascii_uppercase(), definition.into());
    }

    pub fn resolve(&self, code: &str) -> Result<SourceProjection, ProjectionError> {
        if let Some(builtin) = SourceProjection::builtin(code) {
            return Ok(builtin);
        }
        match self.definitions.get(&code.trim().to_ascii_uppercase()) {
            Some(definition) => {
                let def = ProjDefinition::new(code.trim(), definition.as_str())?;
                Ok(SourceProjection::Proj(Arc::new(def)))
            }
            None => code.parse(),
        }
    }
}

/// Narrow capability for mapping between a source space and screen space.
pub trait CoordinateSystem {
    fn to_screen(&self, p: Vec2) -> Vec2;
    fn to_source(&self, p: Vec2) -> Vec2;
}

/// The host's normalized Web-Mercator surface seen from a source projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MercatorSurface {
    source: SourceProjection,
}

impl MercatorSurface {
    pub fn new(source: SourceProjection) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &SourceProjection {
        &self.source
    }
}

impl CoordinateSystem for MercatorSurface {
    fn to_screen(&self, p: Vec2) -> Vec2 {
        mercator_to_unit(self.source.to_mercator(p))
    }

    fn to_source(&self, p: Vec2) -> Vec2 {
        self.source.from_mercator(unit_to_mercator(p))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CoordinateSystem, MERCATOR_HALF_EXTENT, MercatorSurface, ProjDefinition,
        ProjectionError, ProjectionRegistry, SourceProjection, lon_lat_to_mercator,
        mercator_to_lon_lat,
    };
    use crate::math::{LonLat, MERCATOR_MAX_LAT_DEG, Vec2, WGS84_A};

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn half_extent_matches_ellipsoid() {
        assert_close(std::f64::consts::PI * WGS84_A, MERCATOR_HALF_EXTENT, 1e-6);
    }

    #[test]
    fn mercator_origin_and_antimeridian() {
        let o = lon_lat_to_mercator(LonLat::new(0.0, 0.0));
        assert_close(o.x, 0.0, 1e-9);
        assert_close(o.y, 0.0, 1e-9);

        let e = lon_lat_to_mercator(LonLat::new(180.0, 0.0));
        assert_close(e.x, MERCATOR_HALF_EXTENT, 1e-6);
    }

    #[test]
    fn mercator_round_trip() {
        let p = LonLat::new(108.5, 30.25);
        let rt = mercator_to_lon_lat(lon_lat_to_mercator(p));
        assert_close(rt.lon_deg, p.lon_deg, 1e-9);
        assert_close(rt.lat_deg, p.lat_deg, 1e-9);
    }

    #[test]
    fn parses_known_codes() {
        assert_eq!("EPSG:4326".parse(), Ok(SourceProjection::Geographic));
        assert_eq!("epsg:3857".parse(), Ok(SourceProjection::WebMercator));
        assert_eq!(" GOOGLE ".parse(), Ok(SourceProjection::WebMercator));
        assert_eq!(
            "EPSG:2154".parse::<SourceProjection>(),
            Err(ProjectionError::Unknown {
                code: "EPSG:2154".to_string()
            })
        );
    }

    const LAMBERT_93: &str = "+proj=lcc +lat_0=46.5 +lon_0=3 +lat_1=49 +lat_2=44 \
                              +x_0=700000 +y_0=6600000 +ellps=GRS80 +units=m +no_defs";

    #[test]
    fn lambert_corner_matches_proj4() {
        let def = ProjDefinition::new("EPSG:2154", LAMBERT_93).unwrap();
        let ll = def.to_lon_lat(Vec2::new(100_000.0, 6_700_000.0));
        assert_close(ll.lon_deg, -4.928_347_477_659_082_5, 1e-9);
        assert_close(ll.lat_deg, 47.128_942_430_739_54, 1e-9);

        let back = def.from_lon_lat(ll);
        assert_close(back.x, 100_000.0, 1e-4);
        assert_close(back.y, 6_700_000.0, 1e-4);
    }

    #[test]
    fn registry_resolves_defined_codes() {
        let mut registry = ProjectionRegistry::new();
        assert!(matches!(
            registry.resolve("EPSG:2154"),
            Err(ProjectionError::Unknown { .. })
        ));

        registry.define("EPSG:2154", LAMBERT_93);
        let source = registry.resolve("epsg:2154").unwrap();
        assert_eq!(source.code(), "epsg:2154");
        assert!(matches!(source, SourceProjection::Proj(_)));

        // Built-ins are never shadowed.
        registry.define("EPSG:4326", LAMBERT_93);
        assert_eq!(registry.resolve("EPSG:4326"), Ok(SourceProjection::Geographic));
    }

    #[test]
    fn proj_strings_parse_directly() {
        let source: SourceProjection = LAMBERT_93.parse().unwrap();
        let surface = MercatorSurface::new(source);
        let p = surface.to_screen(Vec2::new(100_000.0, 6_700_000.0));
        assert_close(p.x, 0.486_310_145_895_391_45, 1e-10);
        assert_close(p.y, 0.351_200_405_956_490_1, 1e-10);

        let err = ProjDefinition::new("bad", "+proj=no_such_projection").unwrap_err();
        assert!(matches!(err, ProjectionError::InvalidDefinition { .. }));
    }

    #[test]
    fn surface_corners_map_to_unit_square() {
        let surface = MercatorSurface::new(SourceProjection::Geographic);
        let tl = surface.to_screen(Vec2::new(-180.0, MERCATOR_MAX_LAT_DEG));
        assert_close(tl.x, 0.0, 1e-9);
        assert_close(tl.y, 0.0, 1e-9);

        let br = surface.to_screen(Vec2::new(180.0, -MERCATOR_MAX_LAT_DEG));
        assert_close(br.x, 1.0, 1e-9);
        assert_close(br.y, 1.0, 1e-9);

        let center = surface.to_screen(Vec2::new(0.0, 0.0));
        assert_close(center.x, 0.5, 1e-12);
        assert_close(center.y, 0.5, 1e-12);
    }

    #[test]
    fn surface_round_trips_to_source() {
        let surface = MercatorSurface::new(SourceProjection::Geographic);
        let p = Vec2::new(105.289838, 32.204171);
        let back = surface.to_source(surface.to_screen(p));
        assert_close(back.x, p.x, 1e-9);
        assert_close(back.y, p.y, 1e-9);
    }

    #[test]
    fn out_of_range_latitude_is_not_finite() {
        let surface = MercatorSurface::new(SourceProjection::Geographic);
        assert!(!surface.to_screen(Vec2::new(0.0, 100.0)).is_finite());
    }
}
