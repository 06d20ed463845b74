//! Routes prefix messages and native interactions to registered commands.

use std::sync::Arc;

use poise::serenity_prelude as serenity;
use tracing::{debug, error, info, warn};

use crate::adapter::SyntheticInteraction;
use crate::args::tokenize;
use crate::config::AdapterSettings;
use crate::context::{CommandContext, IncomingMessage, UserView};
use crate::error::CommandError;
use crate::registry::{
    BotState, CommandEntry, ComponentEvent, ComponentKind, PrefixInvocation, Registry,
};
use crate::reply::Reply;
use crate::slash::SlashInteraction;
use crate::transport::{fill_response, send_with_retry, ChatTransport, RetryPolicy};
use crate::utils::check_msg;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not addressed to the bot.
    Ignored,
    Unknown(String),
    Executed(String),
    Failed(String),
}

/// How to answer a component interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentResponse {
    Update(Reply),
    Acknowledge,
    Notice(Reply),
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    state: Arc<BotState>,
    transport: Arc<dyn ChatTransport>,
    retry: RetryPolicy,
    adapter: AdapterSettings,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        state: Arc<BotState>,
        transport: Arc<dyn ChatTransport>,
        retry: RetryPolicy,
        adapter: AdapterSettings,
    ) -> Self {
        Dispatcher {
            registry,
            state,
            transport,
            retry,
            adapter,
        }
    }

    pub async fn handle_message(&self, message: &IncomingMessage) -> DispatchOutcome {
        if message.author.bot {
            return DispatchOutcome::Ignored;
        }
        let Some(rest) = strip_prefix(&message.content, &self.state.prefix) else {
            return DispatchOutcome::Ignored;
        };
        let mut tokens = tokenize(rest);
        if tokens.is_empty() {
            return DispatchOutcome::Ignored;
        }
        let name = tokens.remove(0).to_lowercase();
        let args = tokens;

        let Some(entry) = self.registry.prefix_lookup(&name) else {
            debug!("Unknown prefix command '{}' from {}", name, message.author.id);
            self.notify(
                message,
                Reply::text(format!(
                    "Unknown command `{}`. Use `{} help` to see what I can do.",
                    name, self.state.prefix
                )),
            )
            .await;
            return DispatchOutcome::Unknown(name);
        };

        let command = entry.name().to_string();
        info!("Executing command: '{}'", command);
        let result = match &entry.prefix_execute {
            Some(prefix_command) => {
                let invocation =
                    PrefixInvocation::new(message, &args, self.transport.as_ref(), self.retry);
                prefix_command.prefix_execute(&invocation, &self.state).await
            }
            None => {
                let ctx = SyntheticInteraction::new(
                    message.clone(),
                    args.as_slice(),
                    self.transport.clone(),
                    self.retry,
                    &self.adapter,
                );
                entry.execute.execute(&ctx, &self.state).await
            }
        };

        match result {
            Ok(()) => DispatchOutcome::Executed(command),
            Err(e) => {
                log_command_error(&command, &e);
                self.notify(message, Reply::text(e.user_message())).await;
                DispatchOutcome::Failed(command)
            }
        }
    }

    pub async fn handle_interaction(&self, ctx: &serenity::Context, interaction: serenity::Interaction) {
        match interaction {
            serenity::Interaction::ApplicationCommand(command) => {
                self.handle_slash(ctx, command).await
            }
            serenity::Interaction::MessageComponent(component) => {
                self.handle_component(ctx, component).await
            }
            _ => {}
        }
    }

    async fn handle_slash(
        &self,
        ctx: &serenity::Context,
        interaction: serenity::ApplicationCommandInteraction,
    ) {
        let name = interaction.data.name.clone();
        let Some(entry) = self.registry.get(&name) else {
            warn!("Received unregistered slash command '{}'", name);
            return;
        };

        let slash = SlashInteraction::new(ctx.http.clone(), interaction);
        self.run_native(&slash, entry).await;
    }

    /// Runs `entry` against a native context. A failure gets an ephemeral
    /// notice unless the command already answered.
    pub async fn run_native(&self, ctx: &dyn CommandContext, entry: &CommandEntry) -> DispatchOutcome {
        let name = entry.name().to_string();
        info!("Executing command: '{}'", name);
        match entry.execute.execute(ctx, &self.state).await {
            Ok(()) => DispatchOutcome::Executed(name),
            Err(e) => {
                log_command_error(&name, &e);
                if !ctx.replied() {
                    ctx.reply(Reply::text(e.user_message()).ephemeral()).await;
                }
                DispatchOutcome::Failed(name)
            }
        }
    }

    async fn handle_component(
        &self,
        ctx: &serenity::Context,
        component: serenity::MessageComponentInteraction,
    ) {
        let response = match component_kind(component.data.component_type) {
            Some(kind) => {
                let nick = component.member.as_ref().and_then(|m| m.nick.as_deref());
                let event = ComponentEvent {
                    kind,
                    custom_id: component.data.custom_id.clone(),
                    values: component.data.values.clone(),
                    user: UserView::from_user(&component.user, nick),
                    guild_id: component.guild_id,
                    channel_id: component.channel_id,
                };
                self.route_component(&event).await
            }
            None => {
                debug!(
                    "Ignoring {:?} component '{}'",
                    component.data.component_type, component.data.custom_id
                );
                ComponentResponse::Acknowledge
            }
        };
        let result = component
            .create_interaction_response(&ctx.http, |r| match &response {
                ComponentResponse::Update(reply) => r
                    .kind(serenity::InteractionResponseType::UpdateMessage)
                    .interaction_response_data(|d| fill_response(d, reply)),
                ComponentResponse::Acknowledge => {
                    r.kind(serenity::InteractionResponseType::DeferredUpdateMessage)
                }
                ComponentResponse::Notice(reply) => r
                    .kind(serenity::InteractionResponseType::ChannelMessageWithSource)
                    .interaction_response_data(|d| fill_response(d, reply)),
            })
            .await;
        check_msg(result.map_err(Into::into));
    }

    /// Finds the command owning `event` and runs its component handler.
    pub async fn route_component(&self, event: &ComponentEvent) -> ComponentResponse {
        let Some(entry) = self.registry.get(event.target()) else {
            warn!("No command handles component '{}'", event.custom_id);
            return ComponentResponse::Acknowledge;
        };
        debug!("Component '{}' ({:?}) for '{}'", event.custom_id, event.kind, entry.name());
        match entry.execute.component(event, &self.state).await {
            Ok(Some(reply)) => ComponentResponse::Update(reply),
            Ok(None) => ComponentResponse::Acknowledge,
            Err(e) => {
                log_command_error(entry.name(), &e);
                ComponentResponse::Notice(Reply::text(e.user_message()).ephemeral())
            }
        }
    }

    async fn notify(&self, message: &IncomingMessage, reply: Reply) {
        check_msg(
            send_with_retry(
                self.transport.as_ref(),
                message.channel_id,
                &reply,
                &self.retry,
            )
            .await,
        );
    }
}

/// Buttons and select menus are routed; other component types are only
/// acknowledged.
fn component_kind(component_type: serenity::ComponentType) -> Option<ComponentKind> {
    match component_type {
        serenity::ComponentType::Button => Some(ComponentKind::Button),
        serenity::ComponentType::SelectMenu => Some(ComponentKind::SelectMenu),
        _ => None,
    }
}

/// Matches `prefix` case-insensitively at the start of `content`.
fn strip_prefix<'a>(content: &'a str, prefix: &str) -> Option<&'a str> {
    let content = content.trim_start();
    let head = content.get(..prefix.len())?;
    if prefix.is_empty() || !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    Some(&content[prefix.len()..])
}

fn log_command_error(command: &str, err: &CommandError) {
    match err {
        CommandError::Usage(message) => debug!("Command '{}' rejected input: {}", command, message),
        _ => error!("Error in command '{}': {:?}", command, err),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use poise::async_trait;

    use super::*;
    use crate::commands::testing::prefix_ctx;
    use crate::error::{LastfmError, GENERIC_FAILURE};
    use crate::lastfm::testing::FakeScrobbles;
    use crate::registry::testing::state_with;
    use crate::registry::{Command, CommandEntry, CommandSchema, PrefixCommand};
    use crate::transport::testing::{user, RecordingTransport};

    /// Records what the adapter exposes, then replies.
    #[derive(Default)]
    struct ArtistEcho {
        seen: Arc<Mutex<Vec<(Option<String>, bool)>>>,
    }

    #[async_trait]
    impl Command for ArtistEcho {
        fn schema(&self) -> CommandSchema {
            CommandSchema::new("wk", "echoes the artist option")
        }

        async fn execute(
            &self,
            ctx: &dyn CommandContext,
            _state: &BotState,
        ) -> Result<(), CommandError> {
            self.seen
                .lock()
                .unwrap()
                .push((ctx.options().get_string("artist"), ctx.is_prefix()));
            ctx.defer_reply().await;
            ctx.edit_reply(Reply::text("ok")).await;
            Ok(())
        }

        async fn component(
            &self,
            event: &ComponentEvent,
            _state: &BotState,
        ) -> Result<Option<Reply>, CommandError> {
            match event.state() {
                "page:2" => Ok(Some(Reply::text("page 2"))),
                "broken" => Err(CommandError::usage("That page expired.")),
                "period" if event.kind == ComponentKind::SelectMenu => {
                    Ok(Some(Reply::text(format!("period {}", event.values.join(",")))))
                }
                _ => Ok(None),
            }
        }
    }

    #[derive(Default)]
    struct Override {
        args: Arc<Mutex<Vec<Vec<String>>>>,
    }

    #[async_trait]
    impl Command for Override {
        fn schema(&self) -> CommandSchema {
            CommandSchema::new("wk", "override")
        }

        async fn execute(
            &self,
            _ctx: &dyn CommandContext,
            _state: &BotState,
        ) -> Result<(), CommandError> {
            unreachable!("prefix invocations use prefix_execute")
        }
    }

    #[async_trait]
    impl PrefixCommand for Override {
        async fn prefix_execute(
            &self,
            invocation: &PrefixInvocation<'_>,
            _state: &BotState,
        ) -> Result<(), CommandError> {
            self.args.lock().unwrap().push(invocation.args.to_vec());
            invocation.say(Reply::text("override")).await;
            Ok(())
        }
    }

    struct Failing(fn() -> CommandError);

    #[async_trait]
    impl Command for Failing {
        fn schema(&self) -> CommandSchema {
            CommandSchema::new("fail", "always fails").alias("f")
        }

        async fn execute(
            &self,
            _ctx: &dyn CommandContext,
            _state: &BotState,
        ) -> Result<(), CommandError> {
            Err((self.0)())
        }
    }

    /// Answers, then fails.
    struct RepliesThenFails;

    #[async_trait]
    impl Command for RepliesThenFails {
        fn schema(&self) -> CommandSchema {
            CommandSchema::new("half", "replies then fails")
        }

        async fn execute(
            &self,
            ctx: &dyn CommandContext,
            _state: &BotState,
        ) -> Result<(), CommandError> {
            ctx.reply(Reply::text("partial")).await;
            Err(CommandError::Lastfm(LastfmError::Api {
                code: 11,
                message: "Service Offline".into(),
            }))
        }
    }

    fn message(content: &str) -> IncomingMessage {
        IncomingMessage {
            id: serenity::MessageId(1),
            channel_id: serenity::ChannelId(3),
            guild_id: Some(serenity::GuildId(4)),
            author: user(10, "aubrey"),
            author_nick: None,
            content: content.to_string(),
        }
    }

    async fn dispatcher(
        entries: Vec<CommandEntry>,
        transport: Arc<RecordingTransport>,
    ) -> (Dispatcher, tempfile::TempDir) {
        let (state, dir) = state_with(FakeScrobbles::default()).await;
        let retry = RetryPolicy {
            attempts: 3,
            base_delay: Duration::ZERO,
        };
        let dispatcher = Dispatcher::new(
            Arc::new(Registry::new(entries)),
            Arc::new(state),
            transport,
            retry,
            AdapterSettings::default(),
        );
        (dispatcher, dir)
    }

    #[tokio::test]
    async fn prefix_message_reaches_execute_through_adapter() {
        let echo = ArtistEcho::default();
        let seen = echo.seen.clone();
        let transport = Arc::new(RecordingTransport::new());
        let (dispatcher, _dir) = dispatcher(vec![CommandEntry::new(echo)], transport.clone()).await;

        let outcome = dispatcher.handle_message(&message(".fm wk Drake")).await;

        assert_eq!(outcome, DispatchOutcome::Executed("wk".into()));
        assert_eq!(*seen.lock().unwrap(), vec![(Some("Drake".to_string()), true)]);
        assert_eq!(transport.sent(), vec![(serenity::ChannelId(3), Reply::text("ok"))]);
    }

    #[tokio::test]
    async fn prefix_override_gets_raw_args() {
        let command = Override::default();
        let args = command.args.clone();
        let transport = Arc::new(RecordingTransport::new());
        let (dispatcher, _dir) =
            dispatcher(vec![CommandEntry::with_prefix(command)], transport.clone()).await;

        let outcome = dispatcher.handle_message(&message(".fm wk Drake")).await;

        assert_eq!(outcome, DispatchOutcome::Executed("wk".into()));
        assert_eq!(*args.lock().unwrap(), vec![vec!["Drake".to_string()]]);
        assert_eq!(transport.sent()[0].1, Reply::text("override"));
    }

    #[tokio::test]
    async fn prefix_and_name_are_case_insensitive() {
        let transport = Arc::new(RecordingTransport::new());
        let (dispatcher, _dir) =
            dispatcher(vec![CommandEntry::new(ArtistEcho::default())], transport).await;
        assert_eq!(
            dispatcher.handle_message(&message(".FM WK \"Daft Punk\"")).await,
            DispatchOutcome::Executed("wk".into())
        );
    }

    #[tokio::test]
    async fn unknown_command_gets_a_notice() {
        let transport = Arc::new(RecordingTransport::new());
        let (dispatcher, _dir) =
            dispatcher(vec![CommandEntry::new(ArtistEcho::default())], transport.clone()).await;

        let outcome = dispatcher.handle_message(&message(".fm nope")).await;

        assert_eq!(outcome, DispatchOutcome::Unknown("nope".into()));
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.content.as_deref().unwrap().contains("Unknown command `nope`"));
    }

    #[tokio::test]
    async fn unrelated_messages_are_ignored() {
        let transport = Arc::new(RecordingTransport::new());
        let (dispatcher, _dir) =
            dispatcher(vec![CommandEntry::new(ArtistEcho::default())], transport.clone()).await;

        assert_eq!(dispatcher.handle_message(&message("hello .fm wk")).await, DispatchOutcome::Ignored);
        assert_eq!(dispatcher.handle_message(&message(".fm   ")).await, DispatchOutcome::Ignored);

        let mut from_bot = message(".fm wk Drake");
        from_bot.author.bot = true;
        assert_eq!(dispatcher.handle_message(&from_bot).await, DispatchOutcome::Ignored);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn usage_errors_are_shown_to_the_user() {
        let transport = Arc::new(RecordingTransport::new());
        let failing = Failing(|| CommandError::usage("Need an artist name"));
        let (dispatcher, _dir) =
            dispatcher(vec![CommandEntry::new(failing)], transport.clone()).await;

        let outcome = dispatcher.handle_message(&message(".fm f")).await;

        assert_eq!(outcome, DispatchOutcome::Failed("fail".into()));
        assert_eq!(transport.sent()[0].1, Reply::text("Need an artist name"));
    }

    #[tokio::test]
    async fn internal_errors_get_a_generic_notice() {
        let transport = Arc::new(RecordingTransport::new());
        let failing = Failing(|| {
            CommandError::Lastfm(LastfmError::Api {
                code: 11,
                message: "Service Offline".into(),
            })
        });
        let (dispatcher, _dir) =
            dispatcher(vec![CommandEntry::new(failing)], transport.clone()).await;

        assert_eq!(
            dispatcher.handle_message(&message(".fm fail")).await,
            DispatchOutcome::Failed("fail".into())
        );
        assert_eq!(transport.sent()[0].1, Reply::text(GENERIC_FAILURE));
    }

    #[tokio::test]
    async fn components_route_by_custom_id() {
        let transport = Arc::new(RecordingTransport::new());
        let (dispatcher, _dir) =
            dispatcher(vec![CommandEntry::new(ArtistEcho::default())], transport).await;
        let event = |custom_id: &str| ComponentEvent {
            kind: ComponentKind::Button,
            custom_id: custom_id.to_string(),
            values: Vec::new(),
            user: user(10, "aubrey"),
            guild_id: None,
            channel_id: serenity::ChannelId(3),
        };

        assert_eq!(
            dispatcher.route_component(&event("wk:page:2")).await,
            ComponentResponse::Update(Reply::text("page 2"))
        );
        assert_eq!(
            dispatcher.route_component(&event("wk:other")).await,
            ComponentResponse::Acknowledge
        );
        assert_eq!(
            dispatcher.route_component(&event("wk:broken")).await,
            ComponentResponse::Notice(Reply::text("That page expired.").ephemeral())
        );
        assert_eq!(
            dispatcher.route_component(&event("gone:1")).await,
            ComponentResponse::Acknowledge
        );

        let mut menu = event("wk:period");
        menu.kind = ComponentKind::SelectMenu;
        menu.values = vec!["7day".to_string()];
        assert_eq!(
            dispatcher.route_component(&menu).await,
            ComponentResponse::Update(Reply::text("period 7day"))
        );
        assert_eq!(
            dispatcher.route_component(&event("wk:period")).await,
            ComponentResponse::Acknowledge
        );
    }

    #[test]
    fn only_buttons_and_select_menus_are_routed() {
        assert_eq!(
            component_kind(serenity::ComponentType::Button),
            Some(ComponentKind::Button)
        );
        assert_eq!(
            component_kind(serenity::ComponentType::SelectMenu),
            Some(ComponentKind::SelectMenu)
        );
        assert_eq!(component_kind(serenity::ComponentType::ActionRow), None);
        assert_eq!(component_kind(serenity::ComponentType::InputText), None);
    }

    #[tokio::test]
    async fn native_failure_without_reply_gets_a_private_notice() {
        let transport = Arc::new(RecordingTransport::new());
        let failing = Failing(|| CommandError::Lastfm(LastfmError::Api {
            code: 11,
            message: "Service Offline".into(),
        }));
        let (dispatcher, _dir) =
            dispatcher(vec![CommandEntry::new(failing)], transport.clone()).await;
        let ctx = prefix_ctx(".fm fail", user(10, "aubrey"), &transport);
        let entry = dispatcher.registry.get("fail").unwrap();

        let outcome = dispatcher.run_native(&ctx, entry).await;

        assert_eq!(outcome, DispatchOutcome::Failed("fail".into()));
        assert_eq!(
            transport.sent(),
            vec![(serenity::ChannelId(3), Reply::text(GENERIC_FAILURE).ephemeral())]
        );
    }

    #[tokio::test]
    async fn native_usage_error_is_shown_privately() {
        let transport = Arc::new(RecordingTransport::new());
        let failing = Failing(|| CommandError::usage("Need an artist name"));
        let (dispatcher, _dir) =
            dispatcher(vec![CommandEntry::new(failing)], transport.clone()).await;
        let ctx = prefix_ctx(".fm fail", user(10, "aubrey"), &transport);

        dispatcher
            .run_native(&ctx, dispatcher.registry.get("fail").unwrap())
            .await;

        assert_eq!(
            transport.sent(),
            vec![(serenity::ChannelId(3), Reply::text("Need an artist name").ephemeral())]
        );
    }

    #[tokio::test]
    async fn native_failure_after_reply_sends_nothing_more() {
        let transport = Arc::new(RecordingTransport::new());
        let (dispatcher, _dir) =
            dispatcher(vec![CommandEntry::new(RepliesThenFails)], transport.clone()).await;
        let ctx = prefix_ctx(".fm half", user(10, "aubrey"), &transport);

        let outcome = dispatcher
            .run_native(&ctx, dispatcher.registry.get("half").unwrap())
            .await;

        assert_eq!(outcome, DispatchOutcome::Failed("half".into()));
        assert_eq!(
            transport.sent(),
            vec![(serenity::ChannelId(3), Reply::text("partial"))]
        );
    }

    #[test]
    fn prefix_matching() {
        assert_eq!(strip_prefix(".fm np", ".fm"), Some(" np"));
        assert_eq!(strip_prefix("  .Fm np", ".fm"), Some(" np"));
        assert_eq!(strip_prefix(".f", ".fm"), None);
        assert_eq!(strip_prefix("np", ""), None);
        assert_eq!(strip_prefix("é", ".f"), None);
    }
}
