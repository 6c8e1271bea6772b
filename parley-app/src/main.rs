//! Parley console host.
//!
//! Wires cloud (or stub) backends into the engine, prints the conversation
//! as it happens, and shuts the pipeline down cleanly on Ctrl-C.
//!
//! ## Runtime note
//!
//! The engine's workers are plain threads using blocking HTTP clients, so
//! backends are constructed *before* the Tokio runtime exists. The runtime
//! only hosts the event printers and the Ctrl-C handler.

mod personas;
mod settings;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use parley_core::chat::cloud::{CloudChat, CloudChatConfig};
use parley_core::chat::stub::StubChat;
use parley_core::playback::{NullPlayer, Player, PlayerFactory, RodioPlayer};
use parley_core::stt::cloud::{CloudStt, CloudSttConfig};
use parley_core::stt::stub::StubStt;
use parley_core::tts::cloud::{CloudTts, CloudTtsConfig};
use parley_core::tts::stub::StubTts;
use parley_core::{
    ChatHandle, ConversationKind, EngineConfig, ParleyEngine, SttHandle, TtsHandle,
};

use personas::resolve;
use settings::{default_settings_path, load_settings};

/// Environment variable holding the API credential for cloud backends.
const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Parser)]
#[command(name = "parley", about = "Voice assistant loop: listen, think, speak")]
struct Args {
    /// Persona preset (assistant, catty, samuel-jackson).
    #[arg(long)]
    persona: Option<String>,

    /// Preferred input device name (see --list-devices).
    #[arg(long)]
    device: Option<String>,

    /// List audio input devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// Run with stub backends: no credentials, no network, silent playback.
    #[arg(long)]
    stub: bool,

    /// Settings file path (default: per-user data directory).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Override the chat model from settings.
    #[arg(long)]
    chat_model: Option<String>,

    /// Override the TTS voice from settings.
    #[arg(long)]
    voice: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("parley_app=info,parley_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if args.list_devices {
        for device in parley_core::audio::device::list_input_devices() {
            let mut flags = Vec::new();
            if device.is_default {
                flags.push("default");
            }
            if device.is_loopback_like {
                flags.push("loopback?");
            }
            let suffix = if flags.is_empty() {
                String::new()
            } else {
                format!("  [{}]", flags.join(", "))
            };
            println!("{}{suffix}", device.name);
        }
        return Ok(());
    }

    let settings_path = args.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    if !settings_path.exists() {
        if let Err(e) = settings::save_settings(&settings_path, &settings) {
            warn!(error = %e, path = %settings_path.display(), "could not write settings file");
        }
    }
    if let Some(persona) = &args.persona {
        settings.persona = persona.clone();
        settings.normalize();
    }
    if let Some(model) = &args.chat_model {
        settings.chat_model = model.clone();
    }
    if let Some(voice) = &args.voice {
        settings.tts_voice = voice.clone();
    }
    let device = args.device.clone().or(settings.preferred_input_device.clone());

    let persona = resolve(&settings.persona);
    info!(persona = persona.id, "starting parley");

    let config = EngineConfig {
        system_prompt: persona.prompt.into(),
        language_hint: settings.language_hint.clone(),
        no_speech_threshold: settings.no_speech_threshold,
        max_turn_messages: settings.history_window,
        chat_attempts: settings.chat_attempts,
        ..EngineConfig::default()
    };

    let (stt, chat, tts, player_factory) = build_backends(args.stub, &settings)?;

    let engine = Arc::new(ParleyEngine::new(config, stt, chat, tts, player_factory));
    engine.warm_up().context("backend warm-up failed")?;
    engine
        .start_with_device(device)
        .context("engine start failed")?;

    println!("Listening for speech... (Ctrl-C to exit)");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("tokio runtime")?;

    runtime.block_on(async {
        let printer = tokio::spawn(print_conversation(
            engine.subscribe_conversation(),
            persona.display_name,
        ));

        tokio::signal::ctrl_c().await.ok();
        println!();
        info!("shutting down");
        printer.abort();
    });

    if let Err(e) = engine.stop() {
        warn!(error = %e, "engine stop");
    }

    Ok(())
}

fn build_backends(
    stub: bool,
    settings: &settings::AppSettings,
) -> anyhow::Result<(SttHandle, ChatHandle, TtsHandle, PlayerFactory)> {
    if stub {
        info!("using stub backends (no network, silent playback)");
        let factory: PlayerFactory =
            Box::new(|| Ok(Box::new(NullPlayer) as Box<dyn Player>));
        return Ok((
            SttHandle::new(StubStt::new()),
            ChatHandle::new(StubChat::new()),
            TtsHandle::new(StubTts::new()),
            factory,
        ));
    }

    let api_key = std::env::var(API_KEY_ENV)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .with_context(|| format!("set {API_KEY_ENV} or pass --stub"))?;

    let stt = CloudStt::new(
        api_key.clone(),
        CloudSttConfig {
            base_url: settings.api_base_url.clone(),
            model: settings.stt_model.clone(),
            ..CloudSttConfig::default()
        },
    )?;

    let chat = CloudChat::new(
        api_key.clone(),
        CloudChatConfig {
            base_url: settings.api_base_url.clone(),
            model: settings.chat_model.clone(),
            ..CloudChatConfig::default()
        },
    )?;

    let tts = CloudTts::new(
        api_key,
        CloudTtsConfig {
            base_url: settings.api_base_url.clone(),
            model: settings.tts_model.clone(),
            voice: settings.tts_voice.clone(),
            ..CloudTtsConfig::default()
        },
    )?;

    let factory: PlayerFactory =
        Box::new(|| Ok(Box::new(RodioPlayer::new()?) as Box<dyn Player>));

    Ok((
        SttHandle::new(stt),
        ChatHandle::new(chat),
        TtsHandle::new(tts),
        factory,
    ))
}

/// Print the conversation to stdout as events arrive: utterances on their
/// own line, reply tokens streamed in place.
async fn print_conversation(
    mut rx: tokio::sync::broadcast::Receiver<parley_core::ConversationEvent>,
    display_name: &'static str,
) {
    let mut reply_open = false;

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "conversation events lagged");
                continue;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        };

        match event.kind {
            ConversationKind::Utterance => {
                if reply_open {
                    println!();
                    reply_open = false;
                }
                println!("You: {}", event.text);
            }
            ConversationKind::ReplyToken => {
                if !reply_open {
                    print!("{display_name}: ");
                    reply_open = true;
                }
                print!("{}", event.text);
                std::io::stdout().flush().ok();
            }
            ConversationKind::ReplyComplete => {
                if reply_open {
                    println!();
                    reply_open = false;
                }
            }
            ConversationKind::Fallback => {
                if reply_open {
                    println!();
                    reply_open = false;
                }
                println!("{display_name}: {}", event.text);
            }
            ConversationKind::Fragment => {}
        }
    }
}
