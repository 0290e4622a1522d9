//! Build orchestration for kss-styleguide.
//!
//! This crate buffers pipeline input, builds the style guide model once at
//! end-of-input, fans out per-section builds, waits for all of their output
//! to drain, runs the finalize step under the same rule, and only then
//! reports completion to the host pipeline.

pub mod adapter;
pub mod builder;
pub mod dispatch;
pub mod producer;
pub mod sequencer;

pub use adapter::{Contents, SourceFile, StyleguidePipeline};
pub use builder::ModelBuilder;
pub use dispatch::{BuildContext, FinalizeFn, SectionBuildFn};
pub use producer::{Artifact, ArtifactSender, BuildOutput, Producer, channel, drained, merge, single};
pub use sequencer::{Callbacks, ProgressReporter, RunReport, Sequencer, SilentProgress};
