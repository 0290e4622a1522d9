//! Phase sequencing for one pipeline run.
//!
//! Parsing → SectionBuilding → Finalizing → Done, or Failed from any of
//! them. Each phase starts only once the previous phase's producers have
//! drained, and every drain is bounded by the configured phase timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use kss_styleguide_kss::KssParser;
use kss_styleguide_shared::{
    Phase, Result, RunId, SectionRef, StyleguideError, StyleguideModel, StyleguideOptions,
    source_digest,
};

use crate::builder::ModelBuilder;
use crate::dispatch::{self, BuildContext, FinalizeFn, SectionBuildFn};
use crate::producer::{self, Artifact, BuildOutput};

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// Caller-supplied build steps. Both are optional.
#[derive(Clone, Default)]
pub struct Callbacks {
    /// Invoked once per top-level section.
    pub section_build: Option<SectionBuildFn>,
    /// Invoked once after every section build has drained.
    pub all_sections_built: Option<FinalizeFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-section callback. Anything convertible to [`BuildOutput`]
    /// may be returned: `()`, a producer, a `Vec` or an `Option` of them.
    pub fn on_section<F, O>(mut self, callback: F) -> Self
    where
        F: Fn(BuildContext) -> O + Send + Sync + 'static,
        O: Into<BuildOutput>,
    {
        self.section_build = Some(Arc::new(move |ctx: BuildContext| -> BuildOutput {
            callback(ctx).into()
        }));
        self
    }

    /// Set the callback run after all sections are built.
    pub fn on_all_built<F, O>(mut self, callback: F) -> Self
    where
        F: Fn(BuildContext) -> O + Send + Sync + 'static,
        O: Into<BuildOutput>,
    {
        self.all_sections_built = Some(Arc::new(move |ctx: BuildContext| -> BuildOutput {
            callback(ctx).into()
        }));
        self
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("section_build", &self.section_build.is_some())
            .field("all_sections_built", &self.all_sections_built.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, phase: Phase);
    /// Called after a section callback returned its producers.
    fn section_dispatched(&self, reference: &SectionRef, producers: usize);
    /// Called for every artifact a producer yields.
    fn artifact(&self, artifact: &Artifact);
    /// Called when the run completes successfully.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _phase: Phase) {}
    fn section_dispatched(&self, _reference: &SectionRef, _producers: usize) {}
    fn artifact(&self, _artifact: &Artifact) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    /// SHA-256 of the concatenated input.
    pub source_digest: String,
    /// Sections in the parsed model.
    pub section_count: usize,
    /// Section callback invocations.
    pub sections_dispatched: usize,
    /// Artifacts yielded during section building.
    pub section_artifacts: usize,
    /// Artifacts yielded during finalize.
    pub finalize_artifacts: usize,
    pub elapsed: Duration,
    pub completed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

/// Run state; each variant carries what the next phase needs.
enum State {
    Parsing {
        source: String,
    },
    SectionBuilding {
        model: Arc<StyleguideModel>,
    },
    Finalizing {
        model: Arc<StyleguideModel>,
        dispatched: usize,
        section_artifacts: usize,
    },
    Done(RunReport),
    Failed(StyleguideError),
}

impl State {
    fn phase(&self) -> Phase {
        match self {
            Self::Parsing { .. } => Phase::Parsing,
            Self::SectionBuilding { .. } => Phase::SectionBuilding,
            Self::Finalizing { .. } => Phase::Finalizing,
            Self::Done(_) => Phase::Done,
            Self::Failed(_) => Phase::Failed,
        }
    }
}

/// Drives one run through every phase.
pub struct Sequencer<B = KssParser> {
    builder: B,
    options: StyleguideOptions,
    callbacks: Callbacks,
    progress: Arc<dyn ProgressReporter>,
}

impl Sequencer<KssParser> {
    /// Sequencer backed by the KSS parser.
    pub fn kss(options: StyleguideOptions, callbacks: Callbacks) -> Self {
        Self::new(KssParser::new(), options, callbacks)
    }
}

impl<B: ModelBuilder> Sequencer<B> {
    pub fn new(builder: B, options: StyleguideOptions, callbacks: Callbacks) -> Self {
        Self {
            builder,
            options,
            callbacks,
            progress: Arc::new(SilentProgress),
        }
    }

    /// Report phases and artifacts to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub(crate) fn progress(&self) -> &dyn ProgressReporter {
        self.progress.as_ref()
    }

    /// Run every phase over the fully buffered `source`.
    ///
    /// Ends in exactly one of Done (`Ok`) or Failed (`Err`).
    #[instrument(skip_all, fields(run_id = %run_id, len = source.len()))]
    pub async fn run(&self, run_id: RunId, source: String) -> Result<RunReport> {
        let start = Instant::now();
        let digest = source_digest(&source);
        let mut state = State::Parsing { source };

        loop {
            let phase = state.phase();
            debug!(%phase, "entering phase");
            self.progress.phase(phase);

            state = match state {
                State::Parsing { source } => {
                    let options = self.options.parse.clone();
                    match self
                        .bounded(Phase::Parsing, self.builder.build(source, options))
                        .await
                    {
                        Ok(model) => {
                            info!(sections = model.len(), "model built");
                            State::SectionBuilding {
                                model: Arc::new(model),
                            }
                        }
                        Err(e) => State::Failed(e),
                    }
                }

                State::SectionBuilding { model } => {
                    let dispatched = dispatch::dispatch(
                        &model,
                        self.callbacks.section_build.as_ref(),
                        self.progress.as_ref(),
                    );
                    let drained = self
                        .bounded(
                            Phase::SectionBuilding,
                            producer::drain(dispatched.producer, |a| self.progress.artifact(a)),
                        )
                        .await;
                    match drained {
                        Ok(section_artifacts) => State::Finalizing {
                            model,
                            dispatched: dispatched.invocations,
                            section_artifacts,
                        },
                        Err(e) => State::Failed(e),
                    }
                }

                State::Finalizing {
                    model,
                    dispatched,
                    section_artifacts,
                } => {
                    let merged =
                        dispatch::finalize(&model, self.callbacks.all_sections_built.as_ref());
                    let drained = self
                        .bounded(
                            Phase::Finalizing,
                            producer::drain(merged, |a| self.progress.artifact(a)),
                        )
                        .await;
                    match drained {
                        Ok(finalize_artifacts) => State::Done(RunReport {
                            run_id: run_id.clone(),
                            source_digest: digest.clone(),
                            section_count: model.len(),
                            sections_dispatched: dispatched,
                            section_artifacts,
                            finalize_artifacts,
                            elapsed: start.elapsed(),
                            completed_at: Utc::now(),
                        }),
                        Err(e) => State::Failed(e),
                    }
                }

                State::Done(report) => {
                    info!(
                        sections = report.section_count,
                        dispatched = report.sections_dispatched,
                        artifacts = report.section_artifacts + report.finalize_artifacts,
                        elapsed_ms = report.elapsed.as_millis(),
                        "styleguide run complete"
                    );
                    self.progress.done(&report);
                    return Ok(report);
                }

                State::Failed(err) => {
                    warn!(error = %err, "styleguide run failed");
                    return Err(err);
                }
            };
        }
    }

    /// Await `work`, failing with a timeout error once the phase bound passes.
    async fn bounded<T>(&self, phase: Phase, work: impl Future<Output = Result<T>>) -> Result<T> {
        match self.options.phase_timeout {
            Some(after) => tokio::time::timeout(after, work)
                .await
                .map_err(|_| StyleguideError::Timeout { phase, after })?,
            None => work.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::StreamExt;
    use kss_styleguide_shared::ParseOptions;

    use super::*;
    use crate::producer::{Producer, single};

    fn options() -> StyleguideOptions {
        StyleguideOptions {
            phase_timeout: Some(Duration::from_secs(5)),
            ..StyleguideOptions::default()
        }
    }

    struct FailingBuilder;

    impl ModelBuilder for FailingBuilder {
        fn build(
            &self,
            _source: String,
            _options: ParseOptions,
        ) -> impl Future<Output = Result<StyleguideModel>> + Send {
            async { Err(StyleguideError::parse("syntax error at line 1")) }
        }
    }

    /// Records every phase it sees.
    #[derive(Default)]
    struct PhaseLog(Mutex<Vec<Phase>>);

    impl ProgressReporter for PhaseLog {
        fn phase(&self, phase: Phase) {
            self.0.lock().unwrap().push(phase);
        }
        fn section_dispatched(&self, _reference: &SectionRef, _producers: usize) {}
        fn artifact(&self, _artifact: &Artifact) {}
        fn done(&self, _report: &RunReport) {}
    }

    const THREE_ROOTS: &str = "\
/* A\n\nStyleguide 1 */
/* A.1\n\nStyleguide 1.1 */
/* B\n\nStyleguide 2 */
/* C\n\nStyleguide 3 */";

    #[tokio::test]
    async fn finalize_waits_for_staggered_sections() {
        let finished = Arc::new(AtomicUsize::new(0));
        let seen_at_finalize = Arc::new(AtomicUsize::new(usize::MAX));

        let section_done = Arc::clone(&finished);
        let finalize_done = Arc::clone(&finished);
        let observed = Arc::clone(&seen_at_finalize);

        let callbacks = Callbacks::new()
            .on_section(move |ctx: BuildContext| {
                let reference = ctx.current_section.expect("section context");
                // Later sections finish first.
                let delay: u64 = 60 - 15 * reference.as_str().parse::<u64>().unwrap_or(0);
                (0..2)
                    .map(|i| {
                        let done = Arc::clone(&section_done);
                        single(async move {
                            tokio::time::sleep(Duration::from_millis(delay + i * 7)).await;
                            done.fetch_add(1, Ordering::SeqCst);
                            Ok(Artifact::new(format!("part-{i}"), 0))
                        })
                    })
                    .collect::<Vec<Producer>>()
            })
            .on_all_built(move |_ctx: BuildContext| {
                observed.store(finalize_done.load(Ordering::SeqCst), Ordering::SeqCst);
            });

        let report = Sequencer::kss(options(), callbacks)
            .run(RunId::new(), THREE_ROOTS.into())
            .await
            .unwrap();

        assert_eq!(report.section_count, 4);
        assert_eq!(report.sections_dispatched, 3);
        assert_eq!(report.section_artifacts, 6);
        assert_eq!(seen_at_finalize.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn missing_section_callback_still_finalizes() {
        let finalized = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&finalized);
        let callbacks = Callbacks::new().on_all_built(move |_ctx: BuildContext| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        let report = Sequencer::kss(options(), callbacks)
            .run(RunId::new(), THREE_ROOTS.into())
            .await
            .unwrap();

        assert_eq!(report.sections_dispatched, 0);
        assert_eq!(finalized.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn section_failure_skips_finalize() {
        let finalized = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&finalized);
        let callbacks = Callbacks::new()
            .on_section(|ctx: BuildContext| {
                let failing = ctx.current_section.as_ref().map(SectionRef::as_str) == Some("2");
                single(async move {
                    if failing {
                        Err("render failed".into())
                    } else {
                        Ok(Artifact::new("ok", 2))
                    }
                })
            })
            .on_all_built(move |_ctx: BuildContext| {
                count.fetch_add(1, Ordering::SeqCst);
            });

        let err = Sequencer::kss(options(), callbacks)
            .run(RunId::new(), THREE_ROOTS.into())
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Some(Phase::SectionBuilding));
        assert!(err.to_string().contains("render failed"));
        assert_eq!(finalized.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn parse_failure_dispatches_nothing() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&invoked);
        let callbacks = Callbacks::new().on_section(move |_ctx: BuildContext| {
            count.fetch_add(1, Ordering::SeqCst);
        });
        let log = Arc::new(PhaseLog::default());

        let err = Sequencer::new(FailingBuilder, options(), callbacks)
            .with_progress(log.clone())
            .run(RunId::new(), "anything".into())
            .await
            .unwrap_err();

        assert!(matches!(err, StyleguideError::Parse { .. }));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(
            *log.0.lock().unwrap(),
            [Phase::Parsing, Phase::Failed]
        );
    }

    #[tokio::test]
    async fn phases_run_in_order() {
        let log = Arc::new(PhaseLog::default());
        Sequencer::kss(options(), Callbacks::new())
            .with_progress(log.clone())
            .run(RunId::new(), String::new())
            .await
            .unwrap();

        assert_eq!(
            *log.0.lock().unwrap(),
            [
                Phase::Parsing,
                Phase::SectionBuilding,
                Phase::Finalizing,
                Phase::Done
            ]
        );
    }

    #[tokio::test]
    async fn hung_finalize_times_out() {
        let callbacks = Callbacks::new()
            .on_all_built(|_ctx: BuildContext| -> Producer { futures::stream::pending().boxed() });
        let options = StyleguideOptions {
            phase_timeout: Some(Duration::from_millis(30)),
            ..StyleguideOptions::default()
        };

        let err = Sequencer::kss(options, callbacks)
            .run(RunId::new(), String::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StyleguideError::Timeout {
                phase: Phase::Finalizing,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn finalize_failure_is_reported_as_finalize() {
        let callbacks = Callbacks::new().on_all_built(|_ctx: BuildContext| {
            Some(single(async { Err("copy assets failed".into()) }))
        });

        let err = Sequencer::kss(options(), callbacks)
            .run(RunId::new(), String::new())
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Some(Phase::Finalizing));
    }
}
