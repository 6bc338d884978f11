/// Generational handle: `(index, generation)`.
///
/// A slot index may be reused after its occupant is released; the generation
/// distinguishes the new occupant from handles that still point at the old one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u32, u32);

impl Handle {
    pub const fn new(index: u32, generation: u32) -> Self {
        Handle(index, generation)
    }

    pub const fn index(&self) -> u32 {
        self.0
    }

    pub const fn generation(&self) -> u32 {
        self.1
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.0, self.1)
    }
}
