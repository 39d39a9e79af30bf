//! Flows: named, ordered sequences of steps with entry triggers
//!
//! Execution model:
//! - `start` runs from the first step
//! - a non-blocking step hands over to its successor in the same dispatch
//! - a blocking step with a successor pauses the flow; the pointer
//!   `(flow, step)` is stored on the flow's scope record
//! - `resume` asks the paused step to process the reply, then continues
//! - running past the last step (or finishing a terminal blocking step)
//!   completes the flow and clears the pointer

mod error;
mod registry;
mod step;
mod steps;
mod trigger;

pub use error::FlowError;
pub use registry::FlowRegistry;
pub use step::{FlowStep, StepResponse};
pub use steps::{AnswerTarget, MessageStep};
pub use trigger::{CommandTrigger, EventTrigger, Trigger};

use crate::buttons::InteractiveButton;
use crate::dispatch::FlowConnector;
use crate::storage::StepPointer;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Which record a flow keeps its progress on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowScope {
    /// The user's own record; follows the user across channels
    User,
    /// The channel's shared record
    Channel,
}

impl fmt::Display for FlowScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Channel => f.write_str("channel"),
        }
    }
}

/// Where a flow stopped at the end of a dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowProgress {
    Paused { step: String },
    Finished,
}

struct NamedStep {
    name: String,
    step: Arc<dyn FlowStep>,
}

/// A conversation script.
///
/// Built once at startup with the builder methods and registered with the
/// `FlowManager`; immutable afterwards.
pub struct Flow {
    name: String,
    scope: FlowScope,
    triggers: Vec<Box<dyn Trigger>>,
    steps: Vec<NamedStep>,
    reset_bucket_on_start: bool,
    clear_data_on_finish: bool,
}

impl Flow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: FlowScope::User,
            triggers: Vec::new(),
            steps: Vec::new(),
            reset_bucket_on_start: true,
            clear_data_on_finish: true,
        }
    }

    #[must_use]
    pub fn scope(mut self, scope: FlowScope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger: impl Trigger + 'static) -> Self {
        self.triggers.push(Box::new(trigger));
        self
    }

    #[must_use]
    pub fn step(self, name: impl Into<String>, step: impl FlowStep + 'static) -> Self {
        self.shared_step(name, Arc::new(step))
    }

    #[must_use]
    pub fn shared_step(mut self, name: impl Into<String>, step: Arc<dyn FlowStep>) -> Self {
        self.steps.push(NamedStep {
            name: name.into(),
            step,
        });
        self
    }

    #[must_use]
    pub fn reset_bucket_on_start(mut self, reset: bool) -> Self {
        self.reset_bucket_on_start = reset;
        self
    }

    /// Keep the collected `data` after the flow completes
    #[must_use]
    pub fn keep_data_on_finish(mut self) -> Self {
        self.clear_data_on_finish = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flow_scope(&self) -> FlowScope {
        self.scope
    }

    pub fn clears_data_on_finish(&self) -> bool {
        self.clear_data_on_finish
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.name.as_str())
    }

    pub fn step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    /// Every button declared by this flow's steps
    pub fn buttons(&self) -> Vec<Arc<InteractiveButton>> {
        self.steps.iter().flat_map(|s| s.step.buttons()).collect()
    }

    pub(crate) fn validate(&self) -> Result<(), FlowError> {
        if self.name.trim().is_empty() {
            return Err(FlowError::Configuration("flow name is empty".into()));
        }
        if self.steps.is_empty() {
            return Err(FlowError::Configuration(format!(
                "flow {:?} has no steps",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name.as_str()) {
                return Err(FlowError::Configuration(format!(
                    "flow {:?} has duplicate step {:?}",
                    self.name, step.name
                )));
            }
        }
        Ok(())
    }

    pub fn check_triggers(&self, connector: &FlowConnector, scope: FlowScope) -> bool {
        self.triggers.iter().any(|t| t.matches(connector, scope))
    }

    /// Closest blocking step strictly before `index`
    pub fn previous_blocking(&self, index: usize) -> Option<usize> {
        self.steps
            .get(..index)?
            .iter()
            .rposition(|s| !s.step.non_blocking())
    }

    /// Run from the first step
    pub async fn start(&self, connector: &mut FlowConnector) -> Result<FlowProgress, FlowError> {
        connector.set_active_scope(self.scope);
        if self.reset_bucket_on_start {
            connector.bucket_mut().clear();
        }
        tracing::info!(flow = %self.name, user = %connector.user().id, "Starting flow");
        self.run_from(connector, 0).await
    }

    /// Hand the current event to the paused step at `index` and continue.
    /// `scope` names the record holding the pointer, which differs from the
    /// flow's own scope when a channel flow was started without a channel.
    pub async fn resume(
        &self,
        connector: &mut FlowConnector,
        scope: FlowScope,
        index: usize,
    ) -> Result<FlowProgress, FlowError> {
        let entry = self.entry(index)?;
        connector.set_active_scope(scope);

        match entry.step.process_response(connector).await? {
            StepResponse::Done => self.run_from(connector, index + 1).await,
            StepResponse::Stay => {
                tracing::debug!(flow = %self.name, step = %entry.name, "Step kept the flow paused");
                Ok(self.pause(connector, entry))
            }
        }
    }

    /// Re-run the step at `index` and everything after it
    pub async fn rerun(
        &self,
        connector: &mut FlowConnector,
        scope: FlowScope,
        index: usize,
    ) -> Result<FlowProgress, FlowError> {
        self.entry(index)?;
        connector.set_active_scope(scope);
        self.run_from(connector, index).await
    }

    async fn run_from(
        &self,
        connector: &mut FlowConnector,
        start: usize,
    ) -> Result<FlowProgress, FlowError> {
        let last = self.steps.len().saturating_sub(1);

        for (index, entry) in self.steps.iter().enumerate().skip(start) {
            tracing::debug!(flow = %self.name, step = %entry.name, "Running step");
            entry.step.run(connector).await?;

            if !entry.step.non_blocking() && index < last {
                return Ok(self.pause(connector, entry));
            }
        }

        connector.set_state(connector.active_scope(), None);
        tracing::info!(flow = %self.name, user = %connector.user().id, "Flow finished");
        Ok(FlowProgress::Finished)
    }

    fn pause(&self, connector: &mut FlowConnector, entry: &NamedStep) -> FlowProgress {
        let pointer = StepPointer::new(&self.name, &entry.name);
        let scope = connector.active_scope();
        tracing::info!(pointer = %pointer, scope = %scope, "Flow paused");
        connector.set_state(scope, Some(pointer));
        FlowProgress::Paused {
            step: entry.name.clone(),
        }
    }

    fn entry(&self, index: usize) -> Result<&NamedStep, FlowError> {
        self.steps.get(index).ok_or_else(|| {
            FlowError::Configuration(format!(
                "flow {:?} has no step at position {index}",
                self.name
            ))
        })
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("steps", &self.step_names().collect::<Vec<_>>())
            .field("triggers", &self.triggers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchSettings;
    use crate::dispatch::testing::{connector_for, direct_message, RecordingStep, StepLog};

    fn three_steps(log: &StepLog) -> Flow {
        Flow::new("f")
            .trigger(CommandTrigger::new("go"))
            .step("a", RecordingStep::new("a", log).non_blocking())
            .step("b", RecordingStep::new("b", log))
            .step("c", RecordingStep::new("c", log))
    }

    #[test]
    fn test_validate_rejects_empty_and_duplicate_steps() {
        assert!(matches!(
            Flow::new("empty").validate(),
            Err(FlowError::Configuration(_))
        ));

        let log = StepLog::default();
        let flow = Flow::new("dup")
            .step("x", RecordingStep::new("x", &log))
            .step("x", RecordingStep::new("x", &log));
        assert!(matches!(flow.validate(), Err(FlowError::Configuration(_))));

        assert!(three_steps(&log).validate().is_ok());
    }

    #[test]
    fn test_previous_blocking_skips_non_blocking() {
        let log = StepLog::default();
        let flow = three_steps(&log);
        assert_eq!(flow.previous_blocking(0), None);
        assert_eq!(flow.previous_blocking(1), None);
        assert_eq!(flow.previous_blocking(2), Some(1));
    }

    #[tokio::test]
    async fn test_start_runs_until_blocking_step() {
        let log = StepLog::default();
        let flow = three_steps(&log);
        let settings = DispatchSettings::default();
        let mut connector = connector_for(direct_message("u1", "go"), &settings);

        let progress = flow.start(&mut connector).await.unwrap();

        assert_eq!(progress, FlowProgress::Paused { step: "b".into() });
        assert_eq!(log.entries(), vec!["a", "b"]);
        assert_eq!(
            connector.state(FlowScope::User),
            Some(&StepPointer::new("f", "b"))
        );
    }

    #[tokio::test]
    async fn test_resume_continues_after_paused_step() {
        let log = StepLog::default();
        let flow = three_steps(&log);
        let settings = DispatchSettings::default();
        let mut connector = connector_for(direct_message("u1", "answer"), &settings);
        connector.set_state(FlowScope::User, Some(StepPointer::new("f", "b")));

        let progress = flow.resume(&mut connector, FlowScope::User, 1).await.unwrap();

        assert_eq!(progress, FlowProgress::Finished);
        assert_eq!(log.entries(), vec!["b:reply", "c"]);
        assert_eq!(connector.state(FlowScope::User), None);
    }

    #[tokio::test]
    async fn test_start_clears_bucket_unless_disabled() {
        let log = StepLog::default();
        let settings = DispatchSettings::default();

        let mut connector = connector_for(direct_message("u1", "go"), &settings);
        connector.bucket_mut().insert("k".into(), true.into());
        three_steps(&log).start(&mut connector).await.unwrap();
        assert!(connector.bucket().is_empty());

        let mut connector = connector_for(direct_message("u1", "go"), &settings);
        connector.bucket_mut().insert("k".into(), true.into());
        three_steps(&log)
            .reset_bucket_on_start(false)
            .start(&mut connector)
            .await
            .unwrap();
        assert!(!connector.bucket().is_empty());
    }
}
