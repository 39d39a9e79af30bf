//! Flows registered by the server binary

use crate::buttons::{ActionCallback, Button, ButtonStyle, InteractiveButton};
use crate::dispatch::{FinishHook, FlowConnector, FlowManager};
use crate::flow::{AnswerTarget, CommandTrigger, EventTrigger, Flow, FlowError, FlowScope, MessageStep};
use crate::storage::DataMap;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Logs what a finished survey collected
struct SurveyLogger;

#[async_trait]
impl FinishHook for SurveyLogger {
    async fn on_finish(&self, flow: &Flow, connector: &mut FlowConnector) -> Result<(), FlowError> {
        if flow.name() == "survey" {
            tracing::info!(
                user = %connector.user().id,
                data = %serde_json::Value::Object(connector.data().clone()),
                "Survey completed"
            );
        }
        Ok(())
    }
}

/// Data buttons answering the colour question
fn color_buttons() -> Result<Vec<InteractiveButton>, FlowError> {
    ["red", "green", "blue"]
        .into_iter()
        .map(|color| {
            let mut data = DataMap::new();
            data.insert("color".into(), Value::from(color));
            let button = Button::new(color)?.with_custom_id(format!("demo:color:{color}"))?;
            Ok(InteractiveButton::data(button, data))
        })
        .collect()
}

pub fn register(manager: &mut FlowManager) -> Result<(), FlowError> {
    manager.add_flow(
        Flow::new("test")
            .trigger(CommandTrigger::new("test").in_scopes(&[FlowScope::User, FlowScope::Channel]))
            .step("hello", MessageStep::new("hello").non_blocking())
            .step("bye", MessageStep::new("bye")),
    )?;

    let again = InteractiveButton::go_to_flow(
        Button::new("Run the test flow")?
            .with_custom_id("demo:go-to-test")?
            .style(ButtonStyle::Secondary),
        "test",
    );
    manager.add_flow(
        Flow::new("survey")
            .trigger(CommandTrigger::new("start_survey"))
            .step(
                "ask_name",
                MessageStep::new("What is your name?")
                    .store_answer(AnswerTarget::Data, "name")
                    .require_answer("Please type your name."),
            )
            .step(
                "ask_color",
                MessageStep::new("Favourite colour?")
                    .with_buttons(color_buttons()?)
                    .store_answer(AnswerTarget::Data, "color"),
            )
            .step(
                "done",
                MessageStep::new("Thanks! Want to try another flow?").with_buttons([again]),
            ),
    )?;

    let help = InteractiveButton::action(
        Button::new("Help")?
            .with_custom_id("demo:help")?
            .style(ButtonStyle::Success),
        ActionCallback::Step(Arc::new(MessageStep::new(
            "Commands: start_survey, test. Type /back or /reload inside a flow.",
        ))),
    )?;
    manager.add_flow(
        Flow::new("welcome")
            .trigger(EventTrigger::member_joined())
            .step(
                "greet",
                MessageStep::new("Welcome aboard! Type start_survey to begin.").with_buttons([help]),
            ),
    )?;

    manager.on_finish(SurveyLogger);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchSettings;
    use crate::dispatch::testing::{click, direct_message, member_join};
    use crate::interface::BufferInterface;
    use crate::storage::{Address, ConversationStore, MemoryStorage};
    use std::sync::Arc;

    async fn say(manager: &FlowManager, event: crate::event::InboundEvent) -> Vec<String> {
        manager
            .on_event(event, Arc::new(BufferInterface::new()))
            .await
            .unwrap()
            .into_output()
            .unwrap_or_default()
            .into_iter()
            .map(|m| m.content)
            .collect()
    }

    #[tokio::test]
    async fn test_survey_walkthrough() {
        let storage = Arc::new(MemoryStorage::new());
        let mut manager = FlowManager::new(storage.clone(), DispatchSettings::default());
        register(&mut manager).unwrap();

        assert_eq!(
            say(&manager, direct_message("u1", "start_survey")).await,
            vec!["What is your name?"]
        );
        assert_eq!(
            say(&manager, direct_message("u1", "  ")).await,
            vec!["Please type your name."]
        );
        assert_eq!(
            say(&manager, direct_message("u1", "Ada")).await,
            vec!["Favourite colour?"]
        );
        assert_eq!(
            storage.get_data(&Address::new().user("u1")).await.unwrap()["name"],
            "Ada"
        );
        assert_eq!(
            say(&manager, click("u1", "demo:color:green")).await,
            vec!["Thanks! Want to try another flow?"]
        );
        assert_eq!(storage.len().await, 0);

        assert_eq!(
            say(&manager, click("u1", "demo:go-to-test")).await,
            vec!["hello", "bye"]
        );
    }

    #[tokio::test]
    async fn test_welcome_help_button() {
        let storage = Arc::new(MemoryStorage::new());
        let mut manager = FlowManager::new(storage.clone(), DispatchSettings::default());
        register(&mut manager).unwrap();

        assert_eq!(
            say(&manager, member_join("u1")).await,
            vec!["Welcome aboard! Type start_survey to begin."]
        );
        let help = say(&manager, click("u1", "demo:help")).await;
        assert_eq!(help.len(), 1);
        assert!(help[0].starts_with("Commands:"));
        assert_eq!(storage.len().await, 0);
    }

    #[test]
    fn test_register_twice_fails() {
        let mut manager =
            FlowManager::new(Arc::new(MemoryStorage::new()), DispatchSettings::default());
        register(&mut manager).unwrap();
        assert!(matches!(
            register(&mut manager),
            Err(FlowError::DuplicateFlow(name)) if name == "test"
        ));
    }
}
