//! Parley - dialogue-management runtime
//!
//! Reads conversation lines from stdin (`sender: text`, or plain text for
//! the `cli` sender) and prints the bot's answers. `parley evaluate` prints
//! classifier scores for the bot's training data instead.

use parley::classifier::metrics;
use parley::config::StoreKind;
use parley::domain::Answer;
use parley::extension::{ExtensionDispatcher, ExtensionRegistry, RestDispatcher};
use parley::signals::{Signal, Signals};
use parley::{store, Bot, BotDefinition, BotError, Brain, Config, Message};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CLI_SENDER: &str = "cli";
const CLI_CHANNEL: &str = "cli";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; stdout carries the answers
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(path = %config.bot_file.display(), "Loading bot definition");
    let definition = BotDefinition::load(&config.bot_file)?;

    if let Some(model_file) = &config.model_file {
        ensure_parent_dir(model_file)?;
    }
    let brain = Brain::from_definition(&definition, config.model_file.as_deref())?;

    if std::env::args().nth(1).as_deref() == Some("evaluate") {
        let scores = metrics::evaluate(brain.classifier(), &definition.classification);
        println!("{}", serde_json::to_string_pretty(&scores)?);
        return Ok(());
    }

    if config.store.kind == StoreKind::Sql && config.store.sql_url.is_none() {
        ensure_parent_dir(&config.store.sql_path)?;
    }
    let store = store::open(&config.store).await;
    let extensions = discover_extensions(&config).await?;
    warn_unserved_extensions(&brain, &extensions);

    tracing::info!(
        bot = %definition.name,
        store = store.backend(),
        extensions = ?extensions.names(),
        "Bot ready"
    );
    let bot = Arc::new(Bot::new(definition.name, brain, store, extensions, config.replies));

    let mut signals = Signals::install()?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if let Some(message) = parse_line(&line) {
                    // One task per message; awaited so lines are answered in order
                    let bot = bot.clone();
                    if let Err(e) = tokio::spawn(async move { handle(&bot, &message).await }).await {
                        tracing::error!(error = %e, "Message task failed");
                    }
                }
            }
            signal = signals.recv() => match signal {
                Signal::Reload => reload(&bot, &config).await,
                Signal::Shutdown => break,
            },
        }
    }

    tracing::info!(bot = %bot.name(), "Shutting down");
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) => std::fs::create_dir_all(parent),
        None => Ok(()),
    }
}

async fn discover_extensions(config: &Config) -> Result<ExtensionRegistry, Box<dyn std::error::Error>> {
    let mut servers: Vec<(String, Arc<dyn ExtensionDispatcher>)> = Vec::new();
    for server in &config.extensions.servers {
        let dispatcher = RestDispatcher::new(
            &server.url,
            config.extensions.token.clone(),
            config.extensions.timeout,
        )?;
        servers.push((server.name.clone(), Arc::new(dispatcher)));
    }
    Ok(ExtensionRegistry::discover(servers).await?)
}

/// Transitions naming an extension no server handles fail at run time
fn warn_unserved_extensions(brain: &Brain, extensions: &ExtensionRegistry) {
    for transition in &brain.domain().snapshot().transitions {
        if let Some(name) = &transition.extension {
            if !extensions.contains(name) {
                tracing::warn!(
                    extension = %name,
                    command = %transition.command,
                    "No extension server handles this extension"
                );
            }
        }
    }
}

/// `sender: text`, or plain text from the cli sender
fn parse_line(line: &str) -> Option<Message> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let message = match line.split_once(':') {
        Some((sender, text)) if !sender.is_empty() && !sender.contains(char::is_whitespace) => {
            Message::new(sender, text.trim())
        }
        _ => Message::new(CLI_SENDER, line),
    };
    Some(message.with_channel(CLI_CHANNEL))
}

async fn handle(bot: &Bot, message: &Message) {
    match bot.answer(message).await {
        Ok(reply) => print_answers(&reply.conversation_id, &reply.answers),
        // Already logged; the error reply is still sent
        Err(BotError::Extension { answers, .. }) => {
            print_answers(&message.conversation_id(), &answers);
        }
        Err(e) => {
            tracing::error!(sender = %message.sender, error = %e, "Failed to answer message");
        }
    }
}

fn print_answers(conversation_id: &str, answers: &[Answer]) {
    for answer in answers {
        match &answer.image {
            Some(image) => println!("{conversation_id}> {} [{image}]", answer.text),
            None => println!("{conversation_id}> {}", answer.text),
        }
    }
}

async fn reload(bot: &Bot, config: &Config) {
    let brain = BotDefinition::load(&config.bot_file)
        .map_err(BotError::from)
        .and_then(|definition| Brain::from_definition(&definition, config.model_file.as_deref()));
    match brain {
        Ok(brain) => bot.reload(brain).await,
        Err(e) => {
            tracing::error!(
                path = %config.bot_file.display(),
                error = %e,
                "Reload failed, keeping the current bot"
            );
        }
    }
}
