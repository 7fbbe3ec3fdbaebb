//! Ordered step runner
//!
//! Executes planned steps strictly one after another against a backend. The
//! failure policy decides whether the first failure stops the run or whether
//! every step is attempted and failures are counted.

use crate::controlplane::planner::{Step, StepAction};
use crate::domain::ports::ResourceBackend;
use crate::error::{Error, Result};
use tracing::{debug, info, warn};

/// How a run reacts to a failed step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the remaining steps on the first failure
    StopOnFirstFailure,
    /// Attempt every step and count the failures
    ContinueAndCount,
}

/// A step that did not complete
#[derive(Debug)]
pub struct StepFailure {
    /// Human readable step description
    pub step: String,
    pub error: Error,
}

/// Outcome of running a list of steps
#[derive(Debug, Default)]
pub struct RunReport {
    pub succeeded: usize,
    pub failures: Vec<StepFailure>,
    /// Steps never attempted because an earlier one failed
    pub skipped: usize,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Turn the first failure into an error naming the failed step
    pub fn into_result(self) -> Result<usize> {
        match self.failures.into_iter().next() {
            None => Ok(self.succeeded),
            Some(failure) => Err(Error::step(failure.step, failure.error)),
        }
    }
}

/// Runs steps against one backend with one failure policy
pub struct StepRunner<'a> {
    backend: &'a dyn ResourceBackend,
    policy: FailurePolicy,
    /// Membership selector used to find objects for bulk deletes
    selector: String,
}

impl<'a> StepRunner<'a> {
    pub fn new(
        backend: &'a dyn ResourceBackend,
        policy: FailurePolicy,
        selector: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            policy,
            selector: selector.into(),
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Execute `steps` in order
    pub async fn run(&self, steps: &[Step]) -> RunReport {
        let mut report = RunReport::default();

        for (index, step) in steps.iter().enumerate() {
            match self.execute(step).await {
                Ok(()) => {
                    info!("{}: done", step);
                    report.succeeded += 1;
                }
                Err(error) => {
                    warn!("{}: failed: {}", step, error);
                    report.failures.push(StepFailure {
                        step: step.to_string(),
                        error,
                    });
                    if self.policy == FailurePolicy::StopOnFirstFailure {
                        report.skipped = steps.len() - index - 1;
                        break;
                    }
                }
            }
        }

        report
    }

    /// Execute one step
    pub async fn execute(&self, step: &Step) -> Result<()> {
        let ns = step.namespace.as_str();
        match &step.action {
            StepAction::Create(resource) => {
                debug!(
                    "{}: creating {} {}",
                    self.backend.backend_name(),
                    resource.kind(),
                    resource.name()
                );
                self.backend.create(resource).await?;
                Ok(())
            }
            StepAction::Delete { kind, name } => {
                let namespace = kind.is_namespaced().then_some(ns);
                self.backend.delete(*kind, namespace, name).await
            }
            StepAction::DeleteAll { kind } => {
                let items = self
                    .backend
                    .list(*kind, Some(ns), Some(&self.selector))
                    .await?;
                debug!("Deleting {} {} in {}", items.len(), kind.plural(), ns);

                // every item is attempted, the first error is reported
                let mut first_error = None;
                for item in &items {
                    if let Err(e) = self.backend.delete(*kind, Some(ns), item.name()).await {
                        warn!("Failed to delete {} {}: {}", kind, item.name(), e);
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
                match first_error {
                    None => Ok(()),
                    Some(e) => Err(e),
                }
            }
        }
    }
}
