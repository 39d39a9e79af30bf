//! Entry conditions for flows

use super::FlowScope;
use crate::dispatch::FlowConnector;
use crate::event::EventKind;

/// Decides whether an event may start a flow.
///
/// `scope` is the scope the event arrived in, not the flow's own scope.
pub trait Trigger: Send + Sync {
    fn matches(&self, connector: &FlowConnector, scope: FlowScope) -> bool;
}

/// Matches a message whose whole content is the prefixed command
#[derive(Debug, Clone)]
pub struct CommandTrigger {
    command: String,
    allowed_scopes: Vec<FlowScope>,
}

impl CommandTrigger {
    /// Command allowed in direct conversations only
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            allowed_scopes: vec![FlowScope::User],
        }
    }

    #[must_use]
    pub fn in_scopes(mut self, scopes: &[FlowScope]) -> Self {
        self.allowed_scopes = scopes.to_vec();
        self
    }

    /// Initial letter of every `_`-separated part: `start_survey` -> `ss`
    pub fn alias(&self) -> String {
        self.command
            .split('_')
            .filter_map(|part| part.chars().next())
            .collect()
    }
}

impl Trigger for CommandTrigger {
    fn matches(&self, connector: &FlowConnector, scope: FlowScope) -> bool {
        if !self.allowed_scopes.contains(&scope) {
            return false;
        }
        let Some(message) = connector.message() else {
            return false;
        };
        let settings = connector.settings();
        let content = message.content.as_str();

        let Some(command) = content.strip_prefix(settings.command_prefix.as_str()) else {
            return false;
        };
        command == self.command || (settings.command_aliases && command == self.alias())
    }
}

/// Matches a membership event in any scope
#[derive(Debug, Clone, Copy)]
pub struct EventTrigger {
    kind: EventKind,
}

impl EventTrigger {
    pub fn member_joined() -> Self {
        Self {
            kind: EventKind::MemberJoin,
        }
    }

    #[allow(dead_code)] // API completeness
    pub fn member_updated() -> Self {
        Self {
            kind: EventKind::MemberUpdate,
        }
    }
}

impl Trigger for EventTrigger {
    fn matches(&self, connector: &FlowConnector, _scope: FlowScope) -> bool {
        connector.event_kind() == self.kind
    }
}
