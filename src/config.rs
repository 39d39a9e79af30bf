//! Runtime configuration from environment variables

/// Settings the dispatcher and triggers consult on every event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Prepended to every command name
    pub command_prefix: String,
    /// Also accept the initial-letter alias of commands
    pub command_aliases: bool,
    /// Re-run the previous blocking step of the paused flow
    pub go_back_command: String,
    /// Re-run the paused step
    pub reload_command: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            command_prefix: String::new(),
            command_aliases: false,
            go_back_command: "/back".to_string(),
            reload_command: "/reload".to_string(),
        }
    }
}

/// Process configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub dispatch: DispatchSettings,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = DispatchSettings::default();

        let port = lookup("SWITCHYARD_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8000);

        let command_aliases = lookup("SWITCHYARD_COMMAND_ALIASES")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.command_aliases);

        Self {
            port,
            dispatch: DispatchSettings {
                command_prefix: lookup("SWITCHYARD_COMMAND_PREFIX")
                    .unwrap_or(defaults.command_prefix),
                command_aliases,
                go_back_command: lookup("SWITCHYARD_GO_BACK_COMMAND")
                    .unwrap_or(defaults.go_back_command),
                reload_command: lookup("SWITCHYARD_RELOAD_COMMAND")
                    .unwrap_or(defaults.reload_command),
            },
        }
    }
}
