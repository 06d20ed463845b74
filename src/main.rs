mod adapter;
mod args;
mod commands;
mod config;
mod context;
mod dispatch;
mod error;
mod lastfm;
mod registry;
mod reply;
mod slash;
mod store;
mod transport;
mod utils;

use std::sync::Arc;

use dotenv::dotenv;
use poise::serenity_prelude as serenity;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::context::IncomingMessage;
use crate::dispatch::Dispatcher;
use crate::lastfm::LastfmClient;
use crate::registry::{register_commands, BotState, RegistrationScope, Registry};
use crate::store::UserStore;
use crate::transport::DiscordTransport;

pub struct Data {
    dispatcher: Dispatcher,
}
type Error = Box<dyn std::error::Error + Send + Sync>;

async fn event_handler(
    ctx: &serenity::Context,
    event: &poise::Event<'_>,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        poise::Event::Ready { data_about_bot } => {
            info!("{} is connected", data_about_bot.user.name);
        }
        poise::Event::Message { new_message } => {
            let outcome = data
                .dispatcher
                .handle_message(&IncomingMessage::from(new_message))
                .await;
            debug!("Message {}: {:?}", new_message.id, outcome);
        }
        poise::Event::InteractionCreate { interaction } => {
            data.dispatcher
                .handle_interaction(ctx, interaction.clone())
                .await;
        }
        _ => {}
    }
    Ok(())
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => panic!("Failed to start bot: {:?}", error),
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("scrobble_rustbot=debug,info")),
        )
        .init();

    let config = Config::from_env()?;
    let state = Arc::new(BotState {
        lastfm: Arc::new(LastfmClient::new(config.lastfm_api_key.clone())?),
        users: UserStore::load(&config.users_file).await?,
        prefix: config.prefix.clone(),
    });
    let registry = Arc::new(Registry::new(commands::list()));
    info!("Loaded {} commands, prefix '{}'", registry.len(), config.prefix);

    let scope = match config.guild_id {
        Some(guild_id) => RegistrationScope::Guild(guild_id),
        None => RegistrationScope::Global,
    };

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .token(config.discord_token.clone())
        .intents(
            serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::MESSAGE_CONTENT,
        )
        .setup(move |ctx, _ready, _framework| {
            Box::pin(async move {
                register_commands(&*ctx.http, scope, &registry).await?;

                let transport = Arc::new(DiscordTransport::new(ctx.http.clone(), ctx.cache.clone()));
                let dispatcher = Dispatcher::new(
                    registry,
                    state,
                    transport,
                    config.retry,
                    config.adapter,
                );
                Ok(Data { dispatcher })
            })
        });

    framework.run().await?;
    Ok(())
}
