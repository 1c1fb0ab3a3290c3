/// Axis-aligned bounding boxes
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb2 {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl Aabb2 {
    pub fn new(min: [f64; 2], max: [f64; 2]) -> Self {
        Aabb2 { min, max }
    }

    /// Smallest box containing every finite point; `None` if there are none.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = [f64; 2]>,
    {
        let mut out: Option<Aabb2> = None;
        for p in points {
            if !(p[0].is_finite() && p[1].is_finite()) {
                continue;
            }
            out = Some(match out {
                None => Aabb2::new(p, p),
                Some(b) => Aabb2::new(
                    [b.min[0].min(p[0]), b.min[1].min(p[1])],
                    [b.max[0].max(p[0]), b.max[1].max(p[1])],
                ),
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::Aabb2;

    #[test]
    fn from_points_skips_non_finite() {
        let b = Aabb2::from_points([[0.0, 1.0], [f64::NAN, 5.0], [2.0, -1.0]]).unwrap();
        assert_eq!(b, Aabb2::new([0.0, -1.0], [2.0, 1.0]));
        assert!(Aabb2::from_points(Vec::<[f64; 2]>::new()).is_none());
        assert!(Aabb2::from_points([[f64::INFINITY, 0.0]]).is_none());
    }
}
