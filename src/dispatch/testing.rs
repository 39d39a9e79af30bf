//! Mock steps, handlers and event builders for tests

use super::connector::{FlowConnector, ScopedRecord};
use crate::buttons::ActionHandler;
use crate::config::DispatchSettings;
use crate::event::{Channel, ChannelKind, InboundEvent, Interaction, Member, Message, User};
use crate::flow::{FlowError, FlowRegistry, FlowStep, StepResponse};
use crate::interface::BufferInterface;
use crate::storage::{ConversationKey, ConversationRecord};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Event builders
// ============================================================================

pub fn direct_message(user: &str, text: &str) -> InboundEvent {
    InboundEvent::Message(Message::new(User::new(user, user), text))
}

pub fn channel_message(user: &str, channel: &str, text: &str) -> InboundEvent {
    InboundEvent::Message(
        Message::new(User::new(user, user), text).in_channel(Channel::new(channel, ChannelKind::Text)),
    )
}

/// Direct message that carries its private channel
pub fn private_message(user: &str, channel: &str, text: &str) -> InboundEvent {
    InboundEvent::Message(
        Message::new(User::new(user, user), text)
            .in_channel(Channel::new(channel, ChannelKind::Private)),
    )
}

pub fn click(user: &str, custom_id: &str) -> InboundEvent {
    InboundEvent::ButtonClick(Interaction::new(User::new(user, user), custom_id))
}

pub fn member_join(user: &str) -> InboundEvent {
    InboundEvent::MemberJoin(Member {
        user: User::new(user, user),
        guild_id: Some("g1".into()),
        channel: None,
    })
}

// ============================================================================
// Connectors
// ============================================================================

/// Connector with empty records and an empty registry
pub fn connector_for(event: InboundEvent, settings: &DispatchSettings) -> FlowConnector {
    connector_with_buffer(event, settings).0
}

pub fn connector_with_buffer(
    event: InboundEvent,
    settings: &DispatchSettings,
) -> (FlowConnector, Arc<BufferInterface>) {
    let buffer = Arc::new(BufferInterface::new());
    let user_record = ScopedRecord::new(
        ConversationKey::user(event.user().id.clone()),
        ConversationRecord::default(),
    );
    let channel_record = event
        .channel()
        .map(|c| ScopedRecord::new(ConversationKey::chat(c.id.clone()), ConversationRecord::default()))
        .unwrap_or_default();
    let connector = FlowConnector::new(
        Arc::new(FlowRegistry::new()),
        Arc::new(settings.clone()),
        event,
        user_record,
        channel_record,
        buffer.clone(),
    );
    (connector, buffer)
}

// ============================================================================
// Recording step
// ============================================================================

/// Shared, ordered log of step executions
#[derive(Debug, Clone, Default)]
pub struct StepLog(Arc<Mutex<Vec<String>>>);

impl StepLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Step that logs its runs and replies, optionally sleeping mid-run
pub struct RecordingStep {
    name: String,
    log: StepLog,
    non_blocking: bool,
    delay: Option<Duration>,
    response: StepResponse,
}

impl RecordingStep {
    pub fn new(name: &str, log: &StepLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            non_blocking: false,
            delay: None,
            response: StepResponse::Done,
        }
    }

    #[must_use]
    pub fn non_blocking(mut self) -> Self {
        self.non_blocking = true;
        self
    }

    /// Log `name:start`, sleep, then log `name:end`
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn staying(mut self) -> Self {
        self.response = StepResponse::Stay;
        self
    }
}

#[async_trait]
impl FlowStep for RecordingStep {
    async fn run(&self, connector: &mut FlowConnector) -> Result<(), FlowError> {
        match self.delay {
            Some(delay) => {
                self.log.push(format!("{}:start", self.name));
                tokio::time::sleep(delay).await;
                self.log.push(format!("{}:end", self.name));
            }
            None => self.log.push(self.name.clone()),
        }
        connector.send_text(self.name.clone()).await
    }

    async fn process_response(
        &self,
        _connector: &mut FlowConnector,
    ) -> Result<StepResponse, FlowError> {
        self.log.push(format!("{}:reply", self.name));
        Ok(self.response)
    }

    fn non_blocking(&self) -> bool {
        self.non_blocking
    }
}

/// Step that always fails
pub struct FailingStep;

#[async_trait]
impl FlowStep for FailingStep {
    async fn run(&self, _connector: &mut FlowConnector) -> Result<(), FlowError> {
        Err(FlowError::step("boom"))
    }
}

// ============================================================================
// Recording action handler
// ============================================================================

#[derive(Debug, Default)]
pub struct RecordingHandler {
    calls: AtomicUsize,
}

impl RecordingHandler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionHandler for RecordingHandler {
    async fn call(&self, connector: &mut FlowConnector) -> Result<(), FlowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        connector.data_mut().insert("clicked".into(), true.into());
        Ok(())
    }
}
