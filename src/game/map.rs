//! Map collaborator
//!
//! Terrain is a pure function of the map seed. The core only carries the seed
//! (in init snapshots) and hands it to whoever builds the background.

/// Builds a renderable background from a seed
pub trait MapGenerator {
    type Background;

    fn generate(&self, seed: u64) -> Self::Background;
}

impl<F, B> MapGenerator for F
where
    F: Fn(u64) -> B,
{
    type Background = B;

    fn generate(&self, seed: u64) -> B {
        self(seed)
    }
}
