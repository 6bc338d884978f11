/// Monotonic counter used to invalidate work started under an older state.
///
/// Work captures the current [`Generation`] when it starts; before applying a
/// result it checks [`GenerationCounter::is_current`]. Bumping the counter
/// turns every captured generation stale at once.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

#[derive(Debug, Default)]
pub struct GenerationCounter {
    current: u64,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Generation {
        Generation(self.current)
    }

    pub fn bump(&mut self) -> Generation {
        self.current += 1;
        Generation(self.current)
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        generation.0 == self.current
    }
}
