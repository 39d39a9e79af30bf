//! Event dispatch
//!
//! `FlowManager::on_event` is the single entry point for every transport:
//! 1. validate the event and resolve the user and channel keys
//! 2. take the execution locks for those keys (sorted, so never deadlocking)
//! 3. load both records into a `FlowConnector`
//! 4. route: button callbacks, then the paused flow, then triggers
//! 5. settle a finished flow (hooks, cleanup) and persist
//! 6. release the locks and hand back buffered output
//!
//! Nothing is persisted when routing fails. A pointer that names a flow or
//! step that no longer exists is reset and reported as `StaleState`.

mod connector;
mod lock;

#[cfg(test)]
pub mod testing;

pub use connector::{FlowConnector, Navigation, ScopedRecord};
pub use lock::ConversationLocks;

use crate::buttons::{ClickOutcome, InteractiveButton};
use crate::config::DispatchSettings;
use crate::event::{EventKind, InboundEvent, MessageToSend};
use crate::flow::{Flow, FlowError, FlowProgress, FlowRegistry, FlowScope};
use crate::interface::Interface;
use crate::storage::{Address, ConversationKey, ConversationStore, StepPointer};
use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

/// Callback run when a flow completes, before its state is cleared
#[async_trait]
pub trait FinishHook: Send + Sync {
    async fn on_finish(&self, flow: &Flow, connector: &mut FlowConnector) -> Result<(), FlowError>;
}

/// Result of one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Something ran; `output` is what a buffering interface collected
    Handled { output: Option<Vec<MessageToSend>> },
    /// No paused flow, no button and no trigger matched
    Unhandled,
}

impl DispatchOutcome {
    pub fn into_output(self) -> Option<Vec<MessageToSend>> {
        match self {
            Self::Handled { output } => output,
            Self::Unhandled => None,
        }
    }
}

enum Routed {
    Flow(Arc<Flow>, FlowProgress),
    Handled,
    Unhandled,
}

/// Owns the flow registry, the button table and the conversation locks
pub struct FlowManager {
    registry: Arc<FlowRegistry>,
    buttons: HashMap<String, Arc<InteractiveButton>>,
    storage: Arc<dyn ConversationStore>,
    locks: ConversationLocks,
    settings: Arc<DispatchSettings>,
    finish_hooks: Vec<Arc<dyn FinishHook>>,
}

impl FlowManager {
    pub fn new(storage: Arc<dyn ConversationStore>, settings: DispatchSettings) -> Self {
        Self {
            registry: Arc::new(FlowRegistry::new()),
            buttons: HashMap::new(),
            storage,
            locks: ConversationLocks::new(),
            settings: Arc::new(settings),
            finish_hooks: Vec::new(),
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a flow and the buttons its steps declare
    pub fn add_flow(&mut self, flow: Flow) -> Result<Arc<Flow>, FlowError> {
        if self.registry.get(flow.name()).is_some() {
            return Err(FlowError::DuplicateFlow(flow.name().to_string()));
        }

        // The same button may sit on several steps; different buttons may not share an id.
        let mut declared: HashMap<String, Arc<InteractiveButton>> = HashMap::new();
        for button in flow.buttons() {
            self.check_button(&button)?;
            match declared.entry(button.custom_id().to_string()) {
                Entry::Occupied(existing) if !Arc::ptr_eq(existing.get(), &button) => {
                    return Err(duplicate_button(button.custom_id()));
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    slot.insert(button);
                }
            }
        }

        let flow = Arc::make_mut(&mut self.registry).insert(flow)?;
        self.buttons.extend(declared);
        tracing::info!(flow = %flow.name(), scope = %flow.flow_scope(), "Registered flow");
        Ok(flow)
    }

    /// Register a button that no step declares (e.g. one sent by an action handler)
    pub fn add_button(&mut self, button: InteractiveButton) -> Result<(), FlowError> {
        let button = Arc::new(button);
        self.check_button(&button)?;
        self.buttons.insert(button.custom_id().to_string(), button);
        Ok(())
    }

    fn check_button(&self, button: &Arc<InteractiveButton>) -> Result<(), FlowError> {
        match self.buttons.get(button.custom_id()) {
            Some(existing) if !Arc::ptr_eq(existing, button) => {
                Err(duplicate_button(button.custom_id()))
            }
            _ => Ok(()),
        }
    }

    pub fn on_finish(&mut self, hook: impl FinishHook + 'static) {
        self.finish_hooks.push(Arc::new(hook));
    }

    #[allow(dead_code)] // API completeness
    pub fn get_flow(&self, name: &str) -> Option<Arc<Flow>> {
        self.registry.get(name)
    }

    pub fn registry(&self) -> &Arc<FlowRegistry> {
        &self.registry
    }

    #[cfg(test)]
    pub fn locks(&self) -> &ConversationLocks {
        &self.locks
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    pub async fn on_event(
        &self,
        event: InboundEvent,
        interface: Arc<dyn Interface>,
    ) -> Result<DispatchOutcome, FlowError> {
        event.validate()?;

        if event.kind() == EventKind::Message && event.user().bot {
            tracing::debug!(user = %event.user().id, "Ignoring bot message");
            return Ok(DispatchOutcome::Unhandled);
        }

        let user_key = ConversationKey::user(event.user().id.clone());
        let channel_key = event.channel().map(|c| ConversationKey::chat(c.id.clone()));

        let keys = std::iter::once(user_key.clone()).chain(channel_key.clone());
        let _guards = self.locks.acquire_all(keys).await;

        let user_record = self.storage.load_record(&Address::from(&user_key)).await?;
        let user_record = ScopedRecord::new(user_key, user_record);
        let channel_record = match channel_key {
            Some(key) => {
                let record = self.storage.load_record(&Address::from(&key)).await?;
                ScopedRecord::new(key, record)
            }
            None => ScopedRecord::default(),
        };

        tracing::debug!(kind = %event.kind(), user = %event.user().id, "Dispatching event");

        let mut connector = FlowConnector::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.settings),
            event,
            user_record,
            channel_record,
            Arc::clone(&interface),
        );

        match self.route(&mut connector).await {
            Ok(Routed::Unhandled) => return Ok(DispatchOutcome::Unhandled),
            Ok(Routed::Handled) => {}
            Ok(Routed::Flow(flow, FlowProgress::Finished)) => {
                self.finish(&flow, &mut connector).await?;
            }
            Ok(Routed::Flow(flow, FlowProgress::Paused { step })) => {
                tracing::debug!(flow = %flow.name(), step = %step, "Waiting for reply");
            }
            Err(FlowError::StaleState { pointer }) => {
                let scope = stale_scope(&connector, &pointer);
                if let Some(key) = connector.scoped(scope).key.clone() {
                    self.storage.reset_state(&Address::from(&key), false).await?;
                }
                tracing::warn!(pointer = %pointer, "Reset stale conversation state");
                return Err(FlowError::StaleState { pointer });
            }
            Err(e) => return Err(e),
        }

        for scoped in connector.into_records() {
            if let Some(key) = &scoped.key {
                self.storage
                    .save_record(&Address::from(key), scoped.record)
                    .await?;
            }
        }

        Ok(DispatchOutcome::Handled {
            output: interface.flush().await,
        })
    }

    async fn route(&self, connector: &mut FlowConnector) -> Result<Routed, FlowError> {
        if let Some(custom_id) = connector.interaction().map(|i| i.custom_id.clone()) {
            if let Some(button) = self.buttons.get(&custom_id) {
                tracing::debug!(button = %custom_id, "Handling button click");
                match button.on_click(connector).await? {
                    ClickOutcome::FallThrough => {}
                    ClickOutcome::Handled => return Ok(Routed::Handled),
                    ClickOutcome::Flow(flow, progress) => return Ok(Routed::Flow(flow, progress)),
                }
            }
        }

        if let Some(routed) = self.resume(connector).await? {
            return Ok(routed);
        }

        self.trigger(connector).await
    }

    /// Continue the paused flow, if any. Only messages and clicks resume.
    async fn resume(&self, connector: &mut FlowConnector) -> Result<Option<Routed>, FlowError> {
        let kind = connector.event_kind();
        if !matches!(kind, EventKind::Message | EventKind::ButtonClick) {
            return Ok(None);
        }

        let event_scope = connector.event_scope();
        let mut candidates = Vec::with_capacity(2);
        if connector.has_scope(FlowScope::Channel) {
            candidates.push(FlowScope::Channel);
        }
        if event_scope == FlowScope::User || kind == EventKind::ButtonClick {
            candidates.push(FlowScope::User);
        }

        for scope in candidates {
            let Some(pointer) = connector.state(scope).cloned() else {
                continue;
            };
            let stale = || FlowError::StaleState {
                pointer: pointer.clone(),
            };

            let flow = self.registry.get(&pointer.flow).ok_or_else(stale)?;
            // A channel flow started without a channel keeps its pointer on the
            // user record; a user flow never writes to a channel record.
            if scope == FlowScope::Channel && flow.flow_scope() != FlowScope::Channel {
                return Err(stale());
            }
            let index = flow.step_index(&pointer.step).ok_or_else(stale)?;

            tracing::info!(pointer = %pointer, scope = %scope, "Resuming flow");
            let progress = match connector.navigation_command() {
                Some(Navigation::GoBack) => {
                    let target = flow.previous_blocking(index).unwrap_or(0);
                    flow.rerun(connector, scope, target).await?
                }
                Some(Navigation::Reload) => flow.rerun(connector, scope, index).await?,
                None => flow.resume(connector, scope, index).await?,
            };
            return Ok(Some(Routed::Flow(flow, progress)));
        }
        Ok(None)
    }

    /// Start the first registered flow whose trigger matches
    async fn trigger(&self, connector: &mut FlowConnector) -> Result<Routed, FlowError> {
        let scope = connector.event_scope();
        let flow = self
            .registry
            .iter()
            .find(|flow| flow.check_triggers(connector, scope))
            .cloned();

        if let Some(flow) = flow {
            let progress = flow.start(connector).await?;
            return Ok(Routed::Flow(flow, progress));
        }

        if let Some(text) = connector.response_text() {
            let prefix = &self.settings.command_prefix;
            if scope == FlowScope::User && !prefix.is_empty() && text.starts_with(prefix.as_str()) {
                tracing::info!(user = %connector.user().id, command = %text, "Unknown command");
            }
        }
        tracing::debug!(kind = %connector.event_kind(), "Event not handled");
        Ok(Routed::Unhandled)
    }

    /// Run finish hooks, then drop the flow's pointer, bucket and (unless kept) data
    /// on the record the flow ran against
    async fn finish(&self, flow: &Flow, connector: &mut FlowConnector) -> Result<(), FlowError> {
        let scope = connector.active_scope();
        for hook in &self.finish_hooks {
            connector.set_active_scope(scope);
            hook.on_finish(flow, connector).await?;
        }
        let scoped = connector.scoped_mut(scope);
        scoped.record.state = None;
        scoped.record.bucket.clear();
        if flow.clears_data_on_finish() {
            scoped.record.data.clear();
        }
        Ok(())
    }
}

fn duplicate_button(custom_id: &str) -> FlowError {
    FlowError::Configuration(format!("button custom_id {custom_id:?} is already registered"))
}

/// Scope whose record holds `pointer`
fn stale_scope(connector: &FlowConnector, pointer: &StepPointer) -> FlowScope {
    if connector.state(FlowScope::Channel) == Some(pointer) {
        FlowScope::Channel
    } else {
        FlowScope::User
    }
}
