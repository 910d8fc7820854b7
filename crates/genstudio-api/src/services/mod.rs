pub mod artifacts;
pub mod generation;

pub use artifacts::{ArtifactStore, StoredArtifact};
pub use generation::{CancelOutcome, GenerationRunner, RunnerSettings, RunnerStores};
