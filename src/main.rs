use std::sync::Arc;

use balance_warden::balance_source::HttpBalanceSource;
use balance_warden::config::Config;
use balance_warden::i18n::{FALLBACK_LANG, Translator};
use balance_warden::store::YamlMemberStore;
use balance_warden::transport::SerenityTransport;
use balance_warden::{BOT_NAME, Data, Error, commands, handlers, logging};
use poise::serenity_prelude::{self as serenity};
use serenity::{GatewayIntents, Http};
use tracing::{error, info, warn};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    let config = Config::from_env()?;
    logging::init()?;

    if !Translator::supports(&config.default_lang) {
        warn!(
            lang = %config.default_lang,
            fallback = FALLBACK_LANG,
            "Unsupported language, messages will use the fallback"
        );
    }

    let store = YamlMemberStore::load(&config.data_dir, config.default_threshold).await?;
    let transport = SerenityTransport::new(Arc::new(Http::new(&config.discord_token)), config.group_id);
    let source = HttpBalanceSource::new(
        config.balance_api_url.clone(),
        config.balance_api_token.clone(),
    );

    let token = config.discord_token.clone();
    let data = Data::new(config, Arc::new(store), Arc::new(transport), Arc::new(source));
    let handler = handlers::Handler { data: data.clone() };

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx);
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx);
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    logging::log_command_error(&error);
                })
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console("Registering commands and starting the balance sync loop");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                data.balance_sync().spawn();
                Ok(data)
            })
        })
        .build();

    // Member joins need the privileged members intent
    let intents = GatewayIntents::non_privileged() | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(token, intents)
        .event_handler(handler)
        .framework(framework)
        .await?;

    info!("Starting {BOT_NAME}...");
    client.start().await?;

    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to build the runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(async_main()) {
        error!(error = %err, "Bot stopped");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
