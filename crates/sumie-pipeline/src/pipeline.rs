//! Stage pipeline: an ordered, runtime-mutable list of named stages
//! executed sequentially against a [`PipelineContext`].
//!
//! Unlike a fixed function chain, the stage list is inspectable and
//! editable at runtime: callers can drop a stage for a fast preview
//! mode, swap the layer extractor for a different implementation, or
//! re-run the same pipeline repeatedly with adjusted settings in an
//! iterative refinement loop.
//!
//! ```rust
//! # use sumie_pipeline::{ColorLayerStage, ContourTraceStage, PathBuildStage};
//! # use sumie_pipeline::{ConversionSettings, Pipeline, PipelineContext, PipelineError};
//! # fn run(image: sumie_pipeline::RgbaImage) -> Result<(), PipelineError> {
//! let mut pipeline = Pipeline::new();
//! pipeline
//!     .add_stage(ColorLayerStage)
//!     .add_stage(ContourTraceStage)
//!     .add_stage(PathBuildStage);
//!
//! let context = PipelineContext::new(image, ConversionSettings::default());
//! let finished = pipeline.execute(context)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! One context is processed strictly sequentially, stage by stage.
//! Independent conversion jobs may run concurrently, each owning its own
//! context; stages are shared immutably (`Arc`) so a cloned pipeline is
//! cheap. Cancellation and timeouts are the caller's responsibility —
//! e.g. checking an abort flag between `execute` calls.

use std::sync::Arc;

use crate::types::{PipelineContext, PipelineError, StageError};

/// A named unit of pipeline work.
///
/// Stages read the context fields populated by earlier stages and add
/// their own. A stage whose prerequisites are missing must return
/// [`StageError::Configuration`] rather than computing them implicitly.
pub trait PipelineStage: Send + Sync {
    /// Stable name used for lookup, progress reporting, and error
    /// wrapping (e.g. `"trace"`).
    fn name(&self) -> &str;

    /// Execute this stage against the running context.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] on precondition violations or processing
    /// failures; the orchestrator aborts and wraps it with this stage's
    /// name.
    fn run(&self, context: &mut PipelineContext) -> Result<(), StageError>;
}

/// Where [`Pipeline::insert_before`] / [`Pipeline::insert_after`]
/// actually placed the stage.
///
/// A missing anchor is not an error — the stage is appended so the
/// pipeline still runs — but the outcome is reported explicitly so
/// callers can detect a misconfigured anchor name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "check whether the anchor stage was actually found"]
pub enum InsertOutcome {
    /// The anchor was found; the stage sits at the requested position.
    AtAnchor,
    /// The anchor was not found; the stage was appended at the end.
    Appended,
}

/// Ordered, runtime-mutable list of named stages.
///
/// Cloning yields an independent stage *list*: mutating the clone never
/// affects the original. The stages themselves are immutable and shared.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn PipelineStage>>,
}

impl Pipeline {
    /// Create an empty pipeline.
    #[must_use]
    pub const fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Create the default conversion pipeline: layer extraction →
    /// contour tracing → path building.
    #[must_use]
    pub fn with_default_stages() -> Self {
        let mut pipeline = Self::new();
        pipeline
            .add_stage(crate::layers::ColorLayerStage)
            .add_stage(crate::trace::ContourTraceStage)
            .add_stage(crate::paths::PathBuildStage);
        pipeline
    }

    /// Append a stage at the end of the list.
    pub fn add_stage(&mut self, stage: impl PipelineStage + 'static) -> &mut Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Remove the first stage with the given name.
    ///
    /// Returns `true` if a stage was removed, `false` if no stage
    /// matched.
    pub fn remove_stage(&mut self, name: &str) -> bool {
        self.position(name).is_some_and(|idx| {
            self.stages.remove(idx);
            true
        })
    }

    /// Swap the first stage with the given name for `stage`, in place.
    ///
    /// Returns `true` on success, `false` if no stage matched (the list
    /// is left unchanged).
    pub fn replace_stage(&mut self, name: &str, stage: impl PipelineStage + 'static) -> bool {
        self.position(name).is_some_and(|idx| {
            self.stages[idx] = Arc::new(stage);
            true
        })
    }

    /// Insert `stage` immediately before the stage named `anchor`.
    ///
    /// When the anchor is absent the stage is appended at the end and
    /// [`InsertOutcome::Appended`] is returned.
    pub fn insert_before(
        &mut self,
        anchor: &str,
        stage: impl PipelineStage + 'static,
    ) -> InsertOutcome {
        match self.position(anchor) {
            Some(idx) => {
                self.stages.insert(idx, Arc::new(stage));
                InsertOutcome::AtAnchor
            }
            None => {
                self.stages.push(Arc::new(stage));
                InsertOutcome::Appended
            }
        }
    }

    /// Insert `stage` immediately after the stage named `anchor`.
    ///
    /// When the anchor is absent the stage is appended at the end and
    /// [`InsertOutcome::Appended`] is returned.
    pub fn insert_after(
        &mut self,
        anchor: &str,
        stage: impl PipelineStage + 'static,
    ) -> InsertOutcome {
        match self.position(anchor) {
            Some(idx) => {
                self.stages.insert(idx + 1, Arc::new(stage));
                InsertOutcome::AtAnchor
            }
            None => {
                self.stages.push(Arc::new(stage));
                InsertOutcome::Appended
            }
        }
    }

    /// Remove every stage.
    pub fn clear(&mut self) {
        self.stages.clear();
    }

    /// Number of stages.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Read-only view of the stage names, in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Index of the first stage with the given name.
    fn position(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name() == name)
    }

    /// Run every stage in order against `context`.
    ///
    /// Consumes the context and returns it after the final stage. A
    /// zero-stage pipeline returns the context unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Stage`] — the failing stage's name plus
    /// its original error — as soon as any stage fails. The
    /// partially-mutated context is dropped; no partial result is ever
    /// returned.
    pub fn execute(&self, context: PipelineContext) -> Result<PipelineContext, PipelineError> {
        self.execute_inner(context, None)
    }

    /// Like [`execute`](Self::execute), invoking `progress` before each
    /// stage with `(stage_name, 1-based index, total stage count)`.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub fn execute_with_progress<F>(
        &self,
        context: PipelineContext,
        mut progress: F,
    ) -> Result<PipelineContext, PipelineError>
    where
        F: FnMut(&str, usize, usize),
    {
        self.execute_inner(context, Some(&mut progress))
    }

    fn execute_inner(
        &self,
        mut context: PipelineContext,
        mut progress: Option<&mut dyn FnMut(&str, usize, usize)>,
    ) -> Result<PipelineContext, PipelineError> {
        let total = self.stages.len();
        for (index, stage) in self.stages.iter().enumerate() {
            if let Some(callback) = progress.as_deref_mut() {
                callback(stage.name(), index + 1, total);
            }
            stage
                .run(&mut context)
                .map_err(|source| PipelineError::Stage {
                    stage: stage.name().to_owned(),
                    source,
                })?;
        }
        Ok(context)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}
