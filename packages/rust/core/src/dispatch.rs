//! Per-section build dispatch.
//!
//! Invokes the caller's section callback once per top-level section and
//! merges everything the callbacks return into one tracked producer.

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use tracing::debug;

use kss_styleguide_shared::{SectionRef, StyleguideError, StyleguideModel};

use crate::producer::{BuildOutput, TaggedProducer, merge};
use crate::sequencer::ProgressReporter;

/// Read-only view handed to every build callback.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The whole model, shared by every invocation of the run.
    pub model: Arc<StyleguideModel>,
    /// The section being built; `None` for the finalize callback.
    pub current_section: Option<SectionRef>,
}

impl BuildContext {
    pub(crate) fn for_section(model: Arc<StyleguideModel>, reference: SectionRef) -> Self {
        Self {
            model,
            current_section: Some(reference),
        }
    }

    pub(crate) fn for_finalize(model: Arc<StyleguideModel>) -> Self {
        Self {
            model,
            current_section: None,
        }
    }
}

/// Callback invoked once per top-level section.
pub type SectionBuildFn = Arc<dyn Fn(BuildContext) -> BuildOutput + Send + Sync>;

/// Callback invoked once after every section build has drained.
pub type FinalizeFn = Arc<dyn Fn(BuildContext) -> BuildOutput + Send + Sync>;

/// Merged section work plus how many callbacks were invoked.
pub(crate) struct Dispatched {
    pub producer: TaggedProducer,
    pub invocations: usize,
}

/// Run `callback` for each root reference of `model`, in model order.
///
/// Callbacks are called back to back without awaiting; only their returned
/// producers are tracked. With no callback nothing is invoked and the
/// returned producer has already drained.
pub(crate) fn dispatch(
    model: &Arc<StyleguideModel>,
    callback: Option<&SectionBuildFn>,
    progress: &dyn ProgressReporter,
) -> Dispatched {
    let Some(callback) = callback else {
        debug!("no section callback configured");
        return Dispatched {
            producer: merge(Vec::new()),
            invocations: 0,
        };
    };

    let mut tagged: Vec<TaggedProducer> = Vec::new();
    let mut invocations = 0;

    for reference in model.root_references() {
        let context = BuildContext::for_section(Arc::clone(model), reference.clone());
        let producers = callback(context).into_producers();
        invocations += 1;

        debug!(%reference, producers = producers.len(), "section callback invoked");
        progress.section_dispatched(&reference, producers.len());

        tagged.extend(producers.into_iter().map(|producer| {
            let reference = reference.clone();
            producer
                .map_err(move |e| StyleguideError::section_build(reference.clone(), &e))
                .boxed()
        }));
    }

    Dispatched {
        producer: merge(tagged),
        invocations,
    }
}

/// Invoke the finalize callback, if any, and tag its producers.
pub(crate) fn finalize(model: &Arc<StyleguideModel>, callback: Option<&FinalizeFn>) -> TaggedProducer {
    let producers = callback
        .map(|callback| callback(BuildContext::for_finalize(Arc::clone(model))).into_producers())
        .unwrap_or_default();

    debug!(producers = producers.len(), "finalize dispatched");

    merge(
        producers
            .into_iter()
            .map(|producer| producer.map_err(|e| StyleguideError::finalize(&e)).boxed())
            .collect(),
    )
}
