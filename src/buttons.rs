//! Interactive elements
//!
//! A click arrives as a `ButtonClick` event carrying the button's
//! `custom_id`. The manager looks the id up and lets the button decide:
//! - data buttons merge fixed values into the interaction and fall through
//!   to normal dispatch
//! - action buttons run a handler or a step with the connector
//! - go-to-flow buttons start another flow inside the current dispatch

use crate::dispatch::FlowConnector;
use crate::flow::{Flow, FlowError, FlowProgress, FlowStep};
use crate::storage::DataMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub const MAX_LABEL_CHARS: usize = 80;
pub const MAX_CUSTOM_ID_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonStyle {
    #[default]
    Primary,
    Secondary,
    Success,
    Danger,
}

/// Wire description of a button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub custom_id: String,
    #[serde(default)]
    pub style: ButtonStyle,
    #[serde(default)]
    pub disabled: bool,
}

impl Button {
    /// Button with a generated `custom_id`
    pub fn new(label: impl Into<String>) -> Result<Self, FlowError> {
        let label = label.into();
        check_len("label", &label, MAX_LABEL_CHARS)?;
        Ok(Self {
            label,
            custom_id: uuid::Uuid::new_v4().to_string(),
            style: ButtonStyle::default(),
            disabled: false,
        })
    }

    pub fn with_custom_id(mut self, custom_id: impl Into<String>) -> Result<Self, FlowError> {
        let custom_id = custom_id.into();
        if custom_id.is_empty() {
            return Err(FlowError::Validation("custom_id must not be empty".into()));
        }
        check_len("custom_id", &custom_id, MAX_CUSTOM_ID_CHARS)?;
        self.custom_id = custom_id;
        Ok(self)
    }

    #[must_use]
    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = style;
        self
    }

    #[must_use]
    #[allow(dead_code)] // API completeness
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), FlowError> {
    let len = value.chars().count();
    if len > max {
        return Err(FlowError::Validation(format!(
            "{field} must be {max} characters or fewer, got {len}"
        )));
    }
    Ok(())
}

// ============================================================================
// Callbacks
// ============================================================================

/// Async handler invoked by an action button
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn call(&self, connector: &mut FlowConnector) -> Result<(), FlowError>;
}

/// What an action button runs
#[derive(Clone)]
pub enum ActionCallback {
    Direct(Arc<dyn ActionHandler>),
    /// Run directly with the connector, bypassing triggers
    Step(Arc<dyn FlowStep>),
}

#[derive(Clone)]
enum ButtonAction {
    Data(DataMap),
    Action(ActionCallback),
    GoToFlow(String),
}

/// Result of handling a click
#[derive(Debug)]
pub enum ClickOutcome {
    /// Continue with normal dispatch (resume or triggers)
    FallThrough,
    /// The click was fully handled by a callback
    Handled,
    /// A flow was started and ran to the returned position
    Flow(Arc<Flow>, FlowProgress),
}

/// A button together with its click behavior
#[derive(Clone)]
pub struct InteractiveButton {
    button: Button,
    action: ButtonAction,
}

impl InteractiveButton {
    pub fn data(button: Button, data: DataMap) -> Self {
        Self {
            button,
            action: ButtonAction::Data(data),
        }
    }

    /// Fails for non-blocking step callbacks: there is no next step to hand over to
    pub fn action(button: Button, callback: ActionCallback) -> Result<Self, FlowError> {
        if let ActionCallback::Step(step) = &callback {
            if step.non_blocking() {
                return Err(FlowError::Configuration(format!(
                    "button {:?}: non-blocking steps cannot be action callbacks",
                    button.custom_id
                )));
            }
        }
        Ok(Self {
            button,
            action: ButtonAction::Action(callback),
        })
    }

    pub fn go_to_flow(button: Button, flow: impl Into<String>) -> Self {
        Self {
            button,
            action: ButtonAction::GoToFlow(flow.into()),
        }
    }

    pub fn button(&self) -> &Button {
        &self.button
    }

    pub fn custom_id(&self) -> &str {
        &self.button.custom_id
    }

    /// Handle a click. Runs under the conversation lock held by the dispatch.
    pub async fn on_click(&self, connector: &mut FlowConnector) -> Result<ClickOutcome, FlowError> {
        match &self.action {
            ButtonAction::Data(data) => {
                if let Some(interaction) = connector.interaction_mut() {
                    interaction
                        .data
                        .extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                Ok(ClickOutcome::FallThrough)
            }
            ButtonAction::Action(ActionCallback::Direct(handler)) => {
                handler.call(connector).await?;
                Ok(ClickOutcome::Handled)
            }
            ButtonAction::Action(ActionCallback::Step(step)) => {
                step.run(connector).await?;
                Ok(ClickOutcome::Handled)
            }
            ButtonAction::GoToFlow(name) => {
                let flow = connector
                    .registry()
                    .get(name)
                    .ok_or_else(|| FlowError::FlowNotFound(name.clone()))?;
                tracing::info!(button = %self.button.custom_id, flow = %name, "Button switches flow");
                let progress = flow.start(connector).await?;
                Ok(ClickOutcome::Flow(flow, progress))
            }
        }
    }
}

impl fmt::Debug for InteractiveButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.action {
            ButtonAction::Data(_) => "data",
            ButtonAction::Action(_) => "action",
            ButtonAction::GoToFlow(_) => "go_to_flow",
        };
        f.debug_struct("InteractiveButton")
            .field("button", &self.button)
            .field("kind", &kind)
            .finish()
    }
}
