use foundation::math::Vec2;

/// Forward transform from source space to destination space.
///
/// Must be pure: the refiner projects each midpoint once and caches the
/// result. Non-finite outputs are allowed and simply keep the affected edge
/// out of the refinement queue.
pub trait Projector {
    fn project(&self, p: Vec2) -> Vec2;
}

impl<F> Projector for F
where
    F: Fn([f64; 2]) -> [f64; 2],
{
    fn project(&self, p: Vec2) -> Vec2 {
        self(p.as_array()).into()
    }
}

/// The identity transform; every edge of its mesh has zero error.
#[derive(Debug, Copy, Clone, Default)]
pub struct Identity;

impl Projector for Identity {
    fn project(&self, p: Vec2) -> Vec2 {
        p
    }
}
