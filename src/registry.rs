//! Command registration: schemas, entry points, and the lookup tables the
//! dispatcher routes through.

use std::collections::HashMap;
use std::sync::Arc;

use poise::async_trait;
use poise::serenity_prelude as serenity;
use serde::{Serialize, Serializer};
use tracing::{debug, error, info, warn};

use crate::context::{CommandContext, IncomingMessage, SentMessage, UserView};
use crate::error::{CommandError, TransportError};
use crate::lastfm::ScrobbleSource;
use crate::reply::Reply;
use crate::store::UserStore;
use crate::transport::{send_with_retry, ChatTransport, RetryPolicy};

/// Shared services handed to every command invocation.
pub struct BotState {
    pub lastfm: Arc<dyn ScrobbleSource>,
    pub users: UserStore,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandSchema {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOption>,
    /// Extra names accepted by the prefix path.
    #[serde(skip)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOption {
    #[serde(rename = "type")]
    pub kind: OptionKind,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<OptionChoice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionChoice {
    pub name: String,
    pub value: String,
}

/// Discord application command option types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    String = 3,
    Boolean = 5,
    User = 6,
}

impl Serialize for OptionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl CommandSchema {
    pub fn new(name: &str, description: &str) -> Self {
        CommandSchema {
            name: name.to_string(),
            description: description.to_string(),
            options: Vec::new(),
            aliases: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub fn option(mut self, option: CommandOption) -> Self {
        self.options.push(option);
        self
    }
}

impl CommandOption {
    fn new(kind: OptionKind, name: &str, description: &str) -> Self {
        CommandOption {
            kind,
            name: name.to_string(),
            description: description.to_string(),
            required: false,
            choices: Vec::new(),
        }
    }

    pub fn string(name: &str, description: &str) -> Self {
        Self::new(OptionKind::String, name, description)
    }

    pub fn boolean(name: &str, description: &str) -> Self {
        Self::new(OptionKind::Boolean, name, description)
    }

    pub fn user(name: &str, description: &str) -> Self {
        Self::new(OptionKind::User, name, description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn choice(mut self, name: &str, value: &str) -> Self {
        self.choices.push(OptionChoice {
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Button,
    SelectMenu,
}

/// A button press or menu selection on a message a command sent earlier.
#[derive(Debug, Clone)]
pub struct ComponentEvent {
    pub kind: ComponentKind,
    /// `<command>:<command specific state>`
    pub custom_id: String,
    pub values: Vec<String>,
    pub user: UserView,
    pub guild_id: Option<serenity::GuildId>,
    pub channel_id: serenity::ChannelId,
}

impl ComponentEvent {
    /// Name of the command owning the component.
    pub fn target(&self) -> &str {
        self.custom_id
            .split_once(':')
            .map_or(self.custom_id.as_str(), |(head, _)| head)
    }

    /// Everything after the command name.
    pub fn state(&self) -> &str {
        self.custom_id.split_once(':').map_or("", |(_, tail)| tail)
    }
}

#[async_trait]
pub trait Command: Send + Sync {
    fn schema(&self) -> CommandSchema;

    async fn execute(&self, ctx: &dyn CommandContext, state: &BotState)
        -> Result<(), CommandError>;

    /// Handles components whose `custom_id` starts with this command's name.
    /// `Ok(Some(reply))` replaces the message the component is attached to.
    async fn component(
        &self,
        _event: &ComponentEvent,
        _state: &BotState,
    ) -> Result<Option<Reply>, CommandError> {
        Ok(None)
    }
}

/// Entry point used instead of `Command::execute` for prefix messages.
#[async_trait]
pub trait PrefixCommand: Send + Sync {
    async fn prefix_execute(
        &self,
        invocation: &PrefixInvocation<'_>,
        state: &BotState,
    ) -> Result<(), CommandError>;
}

pub struct PrefixInvocation<'a> {
    pub message: &'a IncomingMessage,
    /// Words after the command name.
    pub args: &'a [String],
    transport: &'a dyn ChatTransport,
    retry: RetryPolicy,
}

impl<'a> PrefixInvocation<'a> {
    pub fn new(
        message: &'a IncomingMessage,
        args: &'a [String],
        transport: &'a dyn ChatTransport,
        retry: RetryPolicy,
    ) -> Self {
        PrefixInvocation {
            message,
            args,
            transport,
            retry,
        }
    }

    pub async fn say(&self, reply: Reply) -> Option<SentMessage> {
        match send_with_retry(self.transport, self.message.channel_id, &reply, &self.retry).await {
            Ok(sent) => Some(sent),
            Err(e) => {
                error!("Error sending message: {}", e);
                None
            }
        }
    }
}

#[derive(Clone)]
pub struct CommandEntry {
    pub schema: CommandSchema,
    pub execute: Arc<dyn Command>,
    pub prefix_execute: Option<Arc<dyn PrefixCommand>>,
}

impl CommandEntry {
    pub fn new(command: impl Command + 'static) -> Self {
        CommandEntry {
            schema: command.schema(),
            execute: Arc::new(command),
            prefix_execute: None,
        }
    }

    pub fn with_prefix<C: Command + PrefixCommand + 'static>(command: C) -> Self {
        let command = Arc::new(command);
        CommandEntry {
            schema: command.schema(),
            execute: command.clone(),
            prefix_execute: Some(command),
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }
}

/// Immutable after construction.
#[derive(Default)]
pub struct Registry {
    commands: HashMap<String, Arc<CommandEntry>>,
    prefix_commands: HashMap<String, Arc<CommandEntry>>,
}

impl Registry {
    pub fn new(entries: Vec<CommandEntry>) -> Self {
        let mut registry = Registry::default();
        for entry in entries {
            let name = entry.schema.name.clone();
            if registry.commands.contains_key(&name) {
                warn!("Duplicate command '{}' ignored", name);
                continue;
            }
            let entry = Arc::new(entry);
            for key in std::iter::once(&name).chain(entry.schema.aliases.iter()) {
                registry
                    .prefix_commands
                    .insert(key.to_lowercase(), entry.clone());
            }
            debug!(
                "Loaded command '{}' (prefix override: {})",
                name,
                entry.prefix_execute.is_some()
            );
            registry.commands.insert(name, entry);
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<&CommandEntry> {
        self.commands.get(name).map(Arc::as_ref)
    }

    /// Case-insensitive lookup by name or alias.
    pub fn prefix_lookup(&self, name: &str) -> Option<&CommandEntry> {
        self.prefix_commands
            .get(&name.to_lowercase())
            .map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Schemas sorted by name.
    pub fn schemas(&self) -> Vec<&CommandSchema> {
        let mut schemas: Vec<&CommandSchema> = self.commands.values().map(|e| &e.schema).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn slash_payload(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.schemas()
                .into_iter()
                .filter_map(|schema| match serde_json::to_value(schema) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        error!("Could not serialize schema of '{}': {}", schema.name, e);
                        None
                    }
                })
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationScope {
    Global,
    Guild(serenity::GuildId),
}

/// Slash-command registration endpoints.
#[async_trait]
pub trait CommandRegistrar: Send + Sync {
    async fn guild_command_ids(
        &self,
        guild_id: serenity::GuildId,
    ) -> Result<Vec<u64>, TransportError>;

    async fn delete_guild_command(
        &self,
        guild_id: serenity::GuildId,
        command_id: u64,
    ) -> Result<(), TransportError>;

    /// Replaces every command in `scope` with `commands`.
    async fn overwrite(
        &self,
        scope: RegistrationScope,
        commands: &serde_json::Value,
    ) -> Result<usize, TransportError>;
}

#[async_trait]
impl CommandRegistrar for serenity::Http {
    async fn guild_command_ids(
        &self,
        guild_id: serenity::GuildId,
    ) -> Result<Vec<u64>, TransportError> {
        let commands = self.get_guild_application_commands(guild_id.0).await?;
        Ok(commands.into_iter().map(|c| c.id.0).collect())
    }

    async fn delete_guild_command(
        &self,
        guild_id: serenity::GuildId,
        command_id: u64,
    ) -> Result<(), TransportError> {
        self.delete_guild_application_command(guild_id.0, command_id)
            .await?;
        Ok(())
    }

    async fn overwrite(
        &self,
        scope: RegistrationScope,
        commands: &serde_json::Value,
    ) -> Result<usize, TransportError> {
        let created = match scope {
            RegistrationScope::Global => self.create_global_application_commands(commands).await?,
            RegistrationScope::Guild(guild_id) => {
                self.create_guild_application_commands(guild_id.0, commands)
                    .await?
            }
        };
        Ok(created.len())
    }
}

/// Uploads every registered schema. Guild registration clears the guild's
/// existing commands first so renamed or removed commands don't linger.
pub async fn register_commands(
    registrar: &dyn CommandRegistrar,
    scope: RegistrationScope,
    registry: &Registry,
) -> Result<usize, TransportError> {
    if let RegistrationScope::Guild(guild_id) = scope {
        let stale = registrar.guild_command_ids(guild_id).await?;
        debug!("Removing {} existing commands from guild {}", stale.len(), guild_id);
        for command_id in stale {
            registrar.delete_guild_command(guild_id, command_id).await?;
        }
    }

    let count = registrar
        .overwrite(scope, &registry.slash_payload())
        .await?;
    info!("Registered {} slash commands ({:?})", count, scope);
    Ok(count)
}


#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    struct Noop(&'static str);

    #[async_trait]
    impl Command for Noop {
        fn schema(&self) -> CommandSchema {
            CommandSchema::new(self.0, "does nothing")
        }

        async fn execute(
            &self,
            _ctx: &dyn CommandContext,
            _state: &BotState,
        ) -> Result<(), CommandError> {
            Ok(())
        }
    }

    struct WithPrefix;

    #[async_trait]
    impl Command for WithPrefix {
        fn schema(&self) -> CommandSchema {
            CommandSchema::new("whoknows", "who knows")
                .alias("wk")
                .option(CommandOption::string("artist", "The artist").required())
        }

        async fn execute(
            &self,
            _ctx: &dyn CommandContext,
            _state: &BotState,
        ) -> Result<(), CommandError> {
            Ok(())
        }
    }

    #[async_trait]
    impl PrefixCommand for WithPrefix {
        async fn prefix_execute(
            &self,
            _invocation: &PrefixInvocation<'_>,
            _state: &BotState,
        ) -> Result<(), CommandError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeRegistrar {
        existing: Vec<u64>,
        calls: Mutex<Vec<String>>,
        uploaded: Mutex<Option<serde_json::Value>>,
    }

    #[async_trait]
    impl CommandRegistrar for FakeRegistrar {
        async fn guild_command_ids(
            &self,
            guild_id: serenity::GuildId,
        ) -> Result<Vec<u64>, TransportError> {
            self.calls.lock().unwrap().push(format!("list {}", guild_id.0));
            Ok(self.existing.clone())
        }

        async fn delete_guild_command(
            &self,
            guild_id: serenity::GuildId,
            command_id: u64,
        ) -> Result<(), TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("delete {} {}", guild_id.0, command_id));
            Ok(())
        }

        async fn overwrite(
            &self,
            scope: RegistrationScope,
            commands: &serde_json::Value,
        ) -> Result<usize, TransportError> {
            self.calls.lock().unwrap().push(format!("overwrite {:?}", scope));
            *self.uploaded.lock().unwrap() = Some(commands.clone());
            Ok(commands.as_array().map_or(0, Vec::len))
        }
    }

    fn registry() -> Registry {
        Registry::new(vec![
            CommandEntry::new(Noop("np")),
            CommandEntry::with_prefix(WithPrefix),
            CommandEntry::new(Noop("np")),
        ])
    }

    #[test]
    fn indexes_names_and_aliases() {
        let registry = registry();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("whoknows").is_some());
        assert!(registry.get("wk").is_none());
        assert_eq!(registry.prefix_lookup("WK").unwrap().name(), "whoknows");
        assert_eq!(registry.prefix_lookup("Np").unwrap().name(), "np");
        assert!(registry.prefix_lookup("whoknows").unwrap().prefix_execute.is_some());
        assert!(registry.prefix_lookup("np").unwrap().prefix_execute.is_none());
        assert!(registry.prefix_lookup("nope").is_none());
    }

    #[test]
    fn schema_serializes_to_discord_shape() {
        let value = serde_json::to_value(WithPrefix.schema()).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "whoknows",
                "description": "who knows",
                "options": [
                    {"type": 3, "name": "artist", "description": "The artist", "required": true}
                ]
            })
        );
    }

    #[test]
    fn choices_and_optional_flags_serialize() {
        let option = CommandOption::string("period", "Time period").choice("Week", "7day");
        assert_eq!(
            serde_json::to_value(option).unwrap(),
            json!({
                "type": 3,
                "name": "period",
                "description": "Time period",
                "choices": [{"name": "Week", "value": "7day"}]
            })
        );
    }

    #[tokio::test]
    async fn guild_registration_clears_stale_commands_first() {
        let registrar = FakeRegistrar {
            existing: vec![11, 12],
            ..Default::default()
        };
        let scope = RegistrationScope::Guild(serenity::GuildId(5));
        let count = register_commands(&registrar, scope, &registry()).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            *registrar.calls.lock().unwrap(),
            vec![
                "list 5".to_string(),
                "delete 5 11".to_string(),
                "delete 5 12".to_string(),
                format!("overwrite {:?}", scope),
            ]
        );
        let uploaded = registrar.uploaded.lock().unwrap().clone().unwrap();
        let names: Vec<&str> = uploaded
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["np", "whoknows"]);
    }

    #[tokio::test]
    async fn global_registration_uploads_in_one_call() {
        let registrar = FakeRegistrar::default();
        register_commands(&registrar, RegistrationScope::Global, &registry())
            .await
            .unwrap();
        assert_eq!(
            *registrar.calls.lock().unwrap(),
            vec![format!("overwrite {:?}", RegistrationScope::Global)]
        );
    }

    #[test]
    fn component_ids_name_their_command() {
        let event = ComponentEvent {
            kind: ComponentKind::Button,
            custom_id: "recent:rj:2".to_string(),
            values: Vec::new(),
            user: crate::transport::testing::user(1, "a"),
            guild_id: None,
            channel_id: serenity::ChannelId(1),
        };
        assert_eq!(event.target(), "recent");
        assert_eq!(event.state(), "rj:2");
    }
}
