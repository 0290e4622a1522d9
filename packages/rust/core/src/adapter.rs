//! Pipeline adapter: the outward-facing transform.
//!
//! Files pass through untouched while their contents are buffered. At
//! end-of-input the buffer is handed to the [`Sequencer`], and the host's
//! completion callback fires once with the outcome.

use std::path::{Path, PathBuf};

use futures::stream::{self, Stream, StreamExt};
use tokio::io::AsyncRead;
use tracing::{debug, instrument, warn};

use kss_styleguide_kss::KssParser;
use kss_styleguide_shared::{Phase, Result, RunId, StyleguideError, StyleguideOptions};

use crate::builder::ModelBuilder;
use crate::sequencer::{Callbacks, RunReport, Sequencer};

// ---------------------------------------------------------------------------
// SourceFile
// ---------------------------------------------------------------------------

/// Contents of a file flowing through the pipeline.
pub enum Contents {
    /// Fully loaded bytes.
    Buffer(Vec<u8>),
    /// A nested stream. Not supported by the adapter.
    Stream(Box<dyn AsyncRead + Send + Unpin>),
    /// No contents (e.g. a directory entry).
    Null,
}

impl std::fmt::Debug for Contents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Null => f.write_str("Null"),
        }
    }
}

/// One chunk of pipeline input.
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub contents: Contents,
}

impl SourceFile {
    pub fn buffer(path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: Contents::Buffer(bytes.into()),
        }
    }

    pub fn null(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            contents: Contents::Null,
        }
    }

    pub fn streamed(path: impl Into<PathBuf>, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            path: path.into(),
            contents: Contents::Stream(Box::new(reader)),
        }
    }

    /// Read a file from disk into a buffered chunk.
    pub async fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| StyleguideError::io(path, e))?;
        Ok(Self::buffer(path, bytes))
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.contents, Contents::Stream(_))
    }
}

// ---------------------------------------------------------------------------
// StyleguidePipeline
// ---------------------------------------------------------------------------

/// Buffers pipeline chunks, then runs the sequencer at end-of-input.
pub struct StyleguidePipeline<B = KssParser> {
    sequencer: Sequencer<B>,
    pending: Vec<String>,
    run_id: RunId,
    /// Path of the first chunk rejected by `transform`; the run is halted.
    rejected: Option<PathBuf>,
}

impl StyleguidePipeline<KssParser> {
    /// Pipeline backed by the KSS parser.
    pub fn kss(options: StyleguideOptions, callbacks: Callbacks) -> Self {
        Self::new(Sequencer::kss(options, callbacks))
    }
}

impl<B: ModelBuilder> StyleguidePipeline<B> {
    pub fn new(sequencer: Sequencer<B>) -> Self {
        let run_id = RunId::new();
        debug!(%run_id, "pipeline buffering");
        sequencer.progress().phase(Phase::Buffering);
        Self {
            sequencer,
            pending: Vec::new(),
            run_id,
            rejected: None,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Number of chunks buffered so far.
    pub fn pending_chunks(&self) -> usize {
        self.pending.len()
    }

    /// Observe one chunk and hand it back unchanged.
    ///
    /// Buffered contents are kept for parsing; null contents pass through
    /// without being buffered; streamed contents are rejected. A rejection
    /// halts the pipeline: every later chunk and [`end`](Self::end) fail
    /// with the same error.
    pub fn transform(&mut self, file: SourceFile) -> Result<SourceFile> {
        if let Some(path) = &self.rejected {
            return Err(StyleguideError::InputShape { path: path.clone() });
        }
        if file.is_stream() {
            warn!(path = %file.path.display(), "streamed contents rejected, pipeline halted");
            self.rejected = Some(file.path.clone());
            return Err(StyleguideError::InputShape { path: file.path });
        }
        if let Contents::Buffer(bytes) = &file.contents {
            self.pending.push(String::from_utf8_lossy(bytes).into_owned());
        }
        Ok(file)
    }

    /// End-of-input: parse the buffered chunks and run every build phase.
    ///
    /// A pipeline halted by a rejected chunk fails without running any phase.
    #[instrument(skip_all, fields(run_id = %self.run_id, chunks = self.pending.len()))]
    pub async fn end(self) -> Result<RunReport> {
        if let Some(path) = self.rejected {
            self.sequencer.progress().phase(Phase::Failed);
            return Err(StyleguideError::InputShape { path });
        }
        let source = self.pending.concat();
        self.sequencer.run(self.run_id, source).await
    }

    /// Like [`end`](Self::end), reporting the outcome through `done` exactly once.
    pub async fn end_with<F>(self, done: F) -> Option<RunReport>
    where
        F: FnOnce(Option<StyleguideError>),
    {
        match self.end().await {
            Ok(report) => {
                done(None);
                Some(report)
            }
            Err(e) => {
                done(Some(e));
                None
            }
        }
    }

    /// Wrap `input` as a transform stream.
    ///
    /// Every file is yielded back as it arrives. Once `input` ends the build
    /// phases run; a failure is yielded as a final `Err` and ends the stream.
    pub fn pipe<S>(self, input: S) -> impl Stream<Item = Result<SourceFile>> + Send
    where
        S: Stream<Item = SourceFile> + Send + Unpin + 'static,
        B: 'static,
    {
        stream::unfold(Some((self, input)), |state| async move {
            let (mut pipeline, mut input) = state?;
            match input.next().await {
                Some(file) => match pipeline.transform(file) {
                    Ok(file) => Some((Ok(file), Some((pipeline, input)))),
                    Err(e) => Some((Err(e), None)),
                },
                None => match pipeline.end().await {
                    Ok(_) => None,
                    Err(e) => Some((Err(e), None)),
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures::TryStreamExt;
    use kss_styleguide_shared::{ParseOptions, SectionRef, StyleguideModel};

    use super::*;
    use crate::dispatch::BuildContext;
    use crate::producer::{Artifact, single};

    /// Delegates to the KSS parser and records every source it was given.
    #[derive(Default, Clone)]
    struct RecordingBuilder {
        sources: Arc<Mutex<Vec<String>>>,
    }

    impl ModelBuilder for RecordingBuilder {
        fn build(
            &self,
            source: String,
            options: ParseOptions,
        ) -> impl Future<Output = Result<StyleguideModel>> + Send {
            self.sources.lock().unwrap().push(source.clone());
            async move { kss_styleguide_kss::parse(&source, &options) }
        }
    }

    struct BrokenBuilder;

    impl ModelBuilder for BrokenBuilder {
        fn build(
            &self,
            _source: String,
            _options: ParseOptions,
        ) -> impl Future<Output = Result<StyleguideModel>> + Send {
            async { Err(StyleguideError::parse("unexpected token")) }
        }
    }

    fn options() -> StyleguideOptions {
        StyleguideOptions {
            phase_timeout: Some(Duration::from_secs(5)),
            ..StyleguideOptions::default()
        }
    }

    #[tokio::test]
    async fn chunks_concatenate_in_arrival_order() {
        let builder = RecordingBuilder::default();
        let sources = Arc::clone(&builder.sources);
        let mut pipeline =
            StyleguidePipeline::new(Sequencer::new(builder, options(), Callbacks::new()));

        for (i, chunk) in ["a {}", "/* x", "\n\nStyleguide 1 */", "b {}"].iter().enumerate() {
            let file = SourceFile::buffer(format!("{i}.css"), *chunk);
            let passed = pipeline.transform(file).unwrap();
            assert_eq!(passed.path, PathBuf::from(format!("{i}.css")));
        }
        pipeline.transform(SourceFile::null("dir")).unwrap();
        assert_eq!(pipeline.pending_chunks(), 4);

        let report = pipeline.end().await.unwrap();
        assert_eq!(report.section_count, 1);
        assert_eq!(
            *sources.lock().unwrap(),
            ["a {}/* x\n\nStyleguide 1 */b {}"]
        );
    }

    #[tokio::test]
    async fn passes_contents_through_unchanged() {
        let mut pipeline = StyleguidePipeline::kss(options(), Callbacks::new());
        let out = pipeline
            .transform(SourceFile::buffer("a.css", b"\xff.a{}".to_vec()))
            .unwrap();
        match out.contents {
            Contents::Buffer(bytes) => assert_eq!(bytes, b"\xff.a{}"),
            other => panic!("expected buffer, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn streamed_contents_are_rejected() {
        let mut pipeline = StyleguidePipeline::kss(options(), Callbacks::new());
        let err = pipeline
            .transform(SourceFile::streamed("big.css", tokio::io::empty()))
            .unwrap_err();
        assert!(matches!(err, StyleguideError::InputShape { .. }));
        assert!(err.to_string().starts_with("[kss-styleguide]"));
        assert!(!SourceFile::null("dir").is_stream());
    }

    #[tokio::test]
    async fn rejected_chunk_halts_the_pipeline() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let section_count = Arc::clone(&invoked);
        let finalize_count = Arc::clone(&invoked);
        let callbacks = Callbacks::new()
            .on_section(move |_ctx: BuildContext| {
                section_count.fetch_add(1, Ordering::SeqCst);
            })
            .on_all_built(move |_ctx: BuildContext| {
                finalize_count.fetch_add(1, Ordering::SeqCst);
            });

        let builder = RecordingBuilder::default();
        let sources = Arc::clone(&builder.sources);
        let mut pipeline = StyleguidePipeline::new(Sequencer::new(builder, options(), callbacks));

        pipeline
            .transform(SourceFile::buffer("a.css", "/* A\n\nStyleguide 1 */"))
            .unwrap();
        let streamed = SourceFile::streamed("big.css", tokio::io::empty());
        assert!(streamed.is_stream());
        assert!(pipeline.transform(streamed).is_err());

        let later = pipeline.transform(SourceFile::buffer("c.css", ".c {}"));
        assert!(matches!(
            later,
            Err(StyleguideError::InputShape { ref path }) if path == Path::new("big.css")
        ));
        assert_eq!(pipeline.pending_chunks(), 1);

        let mut outcome = Vec::new();
        let report = pipeline.end_with(|err| outcome.push(err)).await;

        assert!(report.is_none());
        assert_eq!(outcome.len(), 1);
        assert!(matches!(outcome[0], Some(StyleguideError::InputShape { .. })));
        assert!(sources.lock().unwrap().is_empty());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn report_carries_the_pipeline_run_id() {
        let pipeline = StyleguidePipeline::kss(options(), Callbacks::new());
        let run_id = pipeline.run_id().clone();
        let report = pipeline.end().await.unwrap();
        assert_eq!(report.run_id, run_id);
    }

    #[tokio::test]
    async fn no_chunks_means_empty_model_and_done() {
        let builder = RecordingBuilder::default();
        let sources = Arc::clone(&builder.sources);
        let invoked = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&invoked);
        let callbacks = Callbacks::new().on_section(move |_ctx: BuildContext| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        let pipeline = StyleguidePipeline::new(Sequencer::new(builder, options(), callbacks));
        let report = pipeline.end().await.unwrap();

        assert_eq!(*sources.lock().unwrap(), [String::new()]);
        assert_eq!(report.section_count, 0);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn single_section_builds_then_finalizes() {
        let events = Arc::new(Mutex::new(Vec::<String>::new()));
        let section_log = Arc::clone(&events);
        let finalize_log = Arc::clone(&events);

        let callbacks = Callbacks::new()
            .on_section(move |ctx: BuildContext| {
                let reference = ctx.current_section.expect("section context");
                let log = Arc::clone(&section_log);
                single(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    log.lock().unwrap().push(format!("built {reference}"));
                    Ok(Artifact::new(format!("section-{reference}.html"), 0))
                })
            })
            .on_all_built(move |ctx: BuildContext| {
                let log = Arc::clone(&finalize_log);
                log.lock()
                    .unwrap()
                    .push(format!("finalize section={:?}", ctx.current_section));
            });

        let mut pipeline = StyleguidePipeline::kss(options(), callbacks);
        pipeline
            .transform(SourceFile::buffer("a.css", "/* styleguide: 1.0 */"))
            .unwrap();

        let mut outcome = None;
        let report = pipeline.end_with(|err| outcome = Some(err.is_none())).await;

        assert_eq!(outcome, Some(true));
        assert_eq!(report.expect("done").sections_dispatched, 1);
        assert_eq!(
            *events.lock().unwrap(),
            ["built 1.0", "finalize section=None"]
        );
    }

    #[tokio::test]
    async fn builder_failure_reaches_completion_callback() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&invoked);
        let callbacks = Callbacks::new().on_section(move |_ctx: BuildContext| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        let mut pipeline =
            StyleguidePipeline::new(Sequencer::new(BrokenBuilder, options(), callbacks));
        pipeline.transform(SourceFile::buffer("a.css", "/* x */")).unwrap();

        let mut calls = 0;
        let mut error = None;
        let report = pipeline
            .end_with(|err| {
                calls += 1;
                error = err;
            })
            .await;

        assert!(report.is_none());
        assert_eq!(calls, 1);
        assert!(matches!(error, Some(StyleguideError::Parse { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn same_input_gives_same_model() {
        let models = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..2 {
            let sink = Arc::clone(&models);
            let callbacks = Callbacks::new().on_all_built(move |ctx: BuildContext| {
                sink.lock().unwrap().push(ctx.model.as_ref().clone());
            });
            let mut pipeline = StyleguidePipeline::kss(options(), callbacks);
            for chunk in ["/* Buttons\n\n.big - Big.\n\nStyleguide 2 */", "/* Forms\n\nStyleguide 3 */"] {
                pipeline.transform(SourceFile::buffer("x.scss", chunk)).unwrap();
            }
            pipeline.end().await.unwrap();
        }

        let models = models.lock().unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0], models[1]);
        assert!(models[0].get(&SectionRef::new("2")).is_some());
    }

    #[tokio::test]
    async fn pipe_passes_files_and_surfaces_failure_last() {
        let callbacks = Callbacks::new().on_section(|_ctx: BuildContext| {
            single(async { Err("no template".into()) })
        });
        let pipeline = StyleguidePipeline::kss(options(), callbacks);
        let input = stream::iter(vec![
            SourceFile::buffer("a.css", "/* A\n\nStyleguide 1 */"),
            SourceFile::buffer("b.css", ".b {}"),
        ]);

        let results: Vec<Result<SourceFile>> = pipeline.pipe(input).collect().await;
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(matches!(results[2], Err(StyleguideError::SectionBuild { .. })));
    }

    #[tokio::test]
    async fn pipe_ends_cleanly_on_success() {
        let pipeline = StyleguidePipeline::kss(options(), Callbacks::new());
        let input = stream::iter(vec![SourceFile::buffer("a.css", "/* styleguide: 1.0 */")]);
        let files: Vec<SourceFile> = pipeline.pipe(input).try_collect().await.unwrap();
        assert_eq!(files.len(), 1);
    }
}
