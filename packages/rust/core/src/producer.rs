//! Output producers and drain tracking.
//!
//! A producer is any boxed stream of [`Artifact`] results. It has drained
//! once the stream ends; an `Err` item means it failed. The core never looks
//! at artifacts beyond counting them.

use std::future::Future;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;

use kss_styleguide_shared::{ProducerError, Result};

/// Something a build callback emitted. Opaque to the orchestration core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Caller-chosen label, typically an output path.
    pub name: String,
    /// Size of the emitted content in bytes.
    pub bytes: usize,
}

impl Artifact {
    pub fn new(name: impl Into<String>, bytes: usize) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Asynchronous output returned by a build callback.
pub type Producer = BoxStream<'static, std::result::Result<Artifact, ProducerError>>;

/// Producer whose failures have already been attributed to a phase.
pub(crate) type TaggedProducer = BoxStream<'static, Result<Artifact>>;

// ---------------------------------------------------------------------------
// BuildOutput
// ---------------------------------------------------------------------------

/// What a build callback hands back: no async work, one producer, or many.
pub enum BuildOutput {
    Nothing,
    Single(Producer),
    Many(Vec<Producer>),
}

impl BuildOutput {
    /// Normalize every shape into a (possibly empty) list of producers.
    pub fn into_producers(self) -> Vec<Producer> {
        match self {
            Self::Nothing => Vec::new(),
            Self::Single(producer) => vec![producer],
            Self::Many(producers) => producers,
        }
    }
}

impl std::fmt::Debug for BuildOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nothing => f.write_str("Nothing"),
            Self::Single(_) => f.write_str("Single(..)"),
            Self::Many(producers) => write!(f, "Many({} producers)", producers.len()),
        }
    }
}

impl From<()> for BuildOutput {
    fn from((): ()) -> Self {
        Self::Nothing
    }
}

impl From<Producer> for BuildOutput {
    fn from(producer: Producer) -> Self {
        Self::Single(producer)
    }
}

impl From<Vec<Producer>> for BuildOutput {
    fn from(producers: Vec<Producer>) -> Self {
        Self::Many(producers)
    }
}

impl From<Option<Producer>> for BuildOutput {
    fn from(producer: Option<Producer>) -> Self {
        producer.map_or(Self::Nothing, Self::Single)
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

/// A producer that emits the result of one future, then drains.
pub fn single<F>(work: F) -> Producer
where
    F: Future<Output = std::result::Result<Artifact, ProducerError>> + Send + 'static,
{
    stream::once(work).boxed()
}

/// A producer that has already drained.
pub fn drained() -> Producer {
    stream::empty().boxed()
}

/// Sending half of a [`channel`] producer.
pub type ArtifactSender = mpsc::Sender<std::result::Result<Artifact, ProducerError>>;

/// A producer fed from spawned work. It drains when every sender is dropped.
pub fn channel(buffer: usize) -> (ArtifactSender, Producer) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let producer = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed();
    (tx, producer)
}

// ---------------------------------------------------------------------------
// Merge / drain
// ---------------------------------------------------------------------------

/// Combine producers into one that ends once every constituent has ended.
///
/// Items interleave in whatever order the constituents yield them. An empty
/// input gives a producer that has already drained.
pub fn merge<T>(producers: Vec<BoxStream<'static, T>>) -> BoxStream<'static, T>
where
    T: Send + 'static,
{
    if producers.is_empty() {
        return stream::empty().boxed();
    }
    stream::select_all(producers).boxed()
}

/// Consume `merged` to the end, returning how many artifacts it yielded.
///
/// Stops at the first failure; the remaining constituents are dropped.
pub(crate) async fn drain(
    mut merged: TaggedProducer,
    mut on_artifact: impl FnMut(&Artifact),
) -> Result<usize> {
    let mut count = 0;
    while let Some(item) = merged.next().await {
        let artifact = item?;
        on_artifact(&artifact);
        count += 1;
    }
    Ok(count)
}
