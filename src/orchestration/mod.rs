pub mod pipeline;

pub use pipeline::{Pipeline, ProgressFn, RunArtifacts, RunInput, RunOutcome, RunStatus, Stage, StageArtifact};
