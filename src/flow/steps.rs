//! Ready-made steps

use super::{FlowError, FlowStep, StepResponse};
use crate::buttons::InteractiveButton;
use crate::dispatch::FlowConnector;
use crate::event::MessageToSend;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Map a captured answer is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerTarget {
    /// Durable per-conversation data
    Data,
    /// Scratch space cleared when a flow starts or finishes
    Bucket,
}

/// Sends a text, optionally with buttons, and optionally captures the reply.
pub struct MessageStep {
    text: String,
    buttons: Vec<Arc<InteractiveButton>>,
    non_blocking: bool,
    answer: Option<(AnswerTarget, String)>,
    reprompt: Option<String>,
}

impl MessageStep {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
            non_blocking: false,
            answer: None,
            reprompt: None,
        }
    }

    #[must_use]
    pub fn non_blocking(mut self) -> Self {
        self.non_blocking = true;
        self
    }

    #[must_use]
    pub fn with_buttons(mut self, buttons: impl IntoIterator<Item = InteractiveButton>) -> Self {
        self.buttons.extend(buttons.into_iter().map(Arc::new));
        self
    }

    /// Store the reply under `key`
    #[must_use]
    pub fn store_answer(mut self, target: AnswerTarget, key: impl Into<String>) -> Self {
        self.answer = Some((target, key.into()));
        self
    }

    /// Refuse empty replies: send `reprompt` and stay on this step
    #[must_use]
    pub fn require_answer(mut self, reprompt: impl Into<String>) -> Self {
        self.reprompt = Some(reprompt.into());
        self
    }

    /// Reply text, or for a click the value a data button attached under `key`
    /// (falling back to the clicked button's id)
    fn answer_from(connector: &FlowConnector, key: Option<&str>) -> Option<Value> {
        if let Some(text) = connector.response_text() {
            let text = text.trim();
            return (!text.is_empty()).then(|| Value::String(text.to_string()));
        }
        let interaction = connector.interaction()?;
        let attached = key.and_then(|k| interaction.data.get(k)).cloned();
        Some(attached.unwrap_or_else(|| Value::String(interaction.custom_id.clone())))
    }
}

#[async_trait]
impl FlowStep for MessageStep {
    async fn run(&self, connector: &mut FlowConnector) -> Result<(), FlowError> {
        let buttons = self.buttons.iter().map(|b| b.button().clone()).collect();
        connector
            .send(MessageToSend::text(&self.text).with_buttons(buttons))
            .await
    }

    async fn process_response(
        &self,
        connector: &mut FlowConnector,
    ) -> Result<StepResponse, FlowError> {
        let key = self.answer.as_ref().map(|(_, key)| key.as_str());
        let answer = Self::answer_from(connector, key);

        if answer.is_none() {
            if let Some(reprompt) = &self.reprompt {
                connector.send_text(reprompt).await?;
                return Ok(StepResponse::Stay);
            }
        }

        if let (Some((target, key)), Some(answer)) = (&self.answer, answer) {
            let map = match target {
                AnswerTarget::Data => connector.data_mut(),
                AnswerTarget::Bucket => connector.bucket_mut(),
            };
            map.insert(key.clone(), answer);
        }
        Ok(StepResponse::Done)
    }

    fn non_blocking(&self) -> bool {
        self.non_blocking
    }

    fn buttons(&self) -> Vec<Arc<InteractiveButton>> {
        self.buttons.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchSettings;
    use crate::dispatch::testing::{click, connector_with_buffer, direct_message};

    #[tokio::test]
    async fn test_run_sends_text() {
        let settings = DispatchSettings::default();
        let (mut connector, buffer) = connector_with_buffer(direct_message("u1", "go"), &settings);

        MessageStep::new("hello").run(&mut connector).await.unwrap();

        let sent = buffer.snapshot();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content, "hello");
        assert_eq!(sent[0].user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_answer_is_stored_in_data() {
        let settings = DispatchSettings::default();
        let (mut connector, _buffer) =
            connector_with_buffer(direct_message("u1", "  Ada  "), &settings);
        let step = MessageStep::new("name?").store_answer(AnswerTarget::Data, "name");

        let response = step.process_response(&mut connector).await.unwrap();

        assert_eq!(response, StepResponse::Done);
        assert_eq!(connector.data().get("name"), Some(&Value::from("Ada")));
    }

    #[tokio::test]
    async fn test_click_answer_prefers_attached_value() {
        let settings = DispatchSettings::default();
        let mut event = click("u1", "color:red");
        if let crate::event::InboundEvent::ButtonClick(i) = &mut event {
            i.data.insert("color".into(), Value::from("red"));
        }
        let (mut connector, _buffer) = connector_with_buffer(event, &settings);
        let step = MessageStep::new("color?").store_answer(AnswerTarget::Data, "color");
        step.process_response(&mut connector).await.unwrap();
        assert_eq!(connector.data().get("color"), Some(&Value::from("red")));

        let (mut connector, _buffer) = connector_with_buffer(click("u1", "plain"), &settings);
        let step = MessageStep::new("pick").store_answer(AnswerTarget::Bucket, "picked");
        step.process_response(&mut connector).await.unwrap();
        assert_eq!(connector.bucket().get("picked"), Some(&Value::from("plain")));
    }

    #[tokio::test]
    async fn test_required_answer_reprompts_and_stays() {
        let settings = DispatchSettings::default();
        let (mut connector, buffer) = connector_with_buffer(direct_message("u1", "   "), &settings);
        let step = MessageStep::new("name?")
            .store_answer(AnswerTarget::Bucket, "name")
            .require_answer("Please type a name");

        let response = step.process_response(&mut connector).await.unwrap();

        assert_eq!(response, StepResponse::Stay);
        assert!(connector.bucket().is_empty());
        assert_eq!(buffer.snapshot()[0].content, "Please type a name");
    }
}
