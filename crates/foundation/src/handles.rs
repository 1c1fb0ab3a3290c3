/// Stable handle into an [`Arena`](crate::Arena) slot.
///
/// Handles are never reused: a removed slot stays tombstoned, so a stale
/// handle can always be detected.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u32);

impl Handle {
    pub const fn new(index: u32) -> Self {
        Handle(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}
