use std::sync::Arc;

use log::*;

use bookmeet::{
    commands::{BotState, BotStateKey, GENERAL_GROUP, HELP},
    config::Config,
    GenericError,
};

use serenity::{
    async_trait,
    framework::StandardFramework,
    http::Http,
    model::prelude::Ready,
    prelude::{Client, Context, EventHandler, GatewayIntents},
};

struct Handler;

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);
    }
}

#[tokio::main]
async fn main() {
    env_logger::builder()
        .filter_module("bookmeet", log::LevelFilter::Trace)
        .init();
    trace!("Logger init with level TRACE.");

    if let Err(why) = run().await {
        error!("Client error: {:?}", why);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), GenericError> {
    let config = Config::from_env()?;
    let state = BotState::from_config(&config)?;
    info!(
        "Ranking top {} with {} concurrent lookups, geocoder {:?}.",
        config.ranker.top_n, config.ranker.concurrency, config.geocoder
    );

    let http = Http::new(&config.discord_token);
    let bot_id = http.get_current_user().await?.id;

    let framework = StandardFramework::new()
        .configure(|c| {
            c.with_whitespace(true)
                .on_mention(Some(bot_id))
                .prefix(config.prefix.as_str())
        })
        .help(&HELP)
        .group(&GENERAL_GROUP);

    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(Handler)
        .framework(framework)
        .type_map_insert::<BotStateKey>(Arc::new(state))
        .await?;

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down shards.");
            shard_manager.lock().await.shutdown_all().await;
        }
    });

    client.start().await?;
    Ok(())
}
