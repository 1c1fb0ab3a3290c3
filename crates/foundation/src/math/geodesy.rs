/// WGS84 semi-major axis (meters).
pub const WGS84_A: f64 = 6_378_137.0;

/// Largest latitude (degrees) representable on the square Web-Mercator plane.
pub const MERCATOR_MAX_LAT_DEG: f64 = 85.051_128_779_806_59;

/// Geographic coordinates in degrees, longitude first.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LonLat {
    pub lon_deg: f64,
    pub lat_deg: f64,
}

impl LonLat {
    pub fn new(lon_deg: f64, lat_deg: f64) -> Self {
        Self { lon_deg, lat_deg }
    }

    pub fn lon_rad(self) -> f64 {
        self.lon_deg.to_radians()
    }

    pub fn lat_rad(self) -> f64 {
        self.lat_deg.to_radians()
    }
}
