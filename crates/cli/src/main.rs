#![deny(warnings)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use maria_voice_core::config::{
    parse_affect_tags, resolve_api_key, resolve_bool_with_default, resolve_f32_with_default,
    resolve_optional_string, resolve_string_with_default, AppConfig, BaselineVoice,
    CartesiaConfig, Env, StdEnv, DEFAULT_BASELINE_SPEED, DEFAULT_CARTESIA_LANGUAGE,
    DEFAULT_CARTESIA_MODEL, DEFAULT_CARTESIA_VOICE_ID, ENV_CARTESIA_API_KEY,
    ENV_CARTESIA_EMOTION, ENV_CARTESIA_LANGUAGE, ENV_CARTESIA_MODEL, ENV_CARTESIA_SPEED,
    ENV_CARTESIA_VOICE_ID, ENV_ENABLE_ADAPTIVE_VOICE, ENV_LEXICON_PATH,
};
use maria_voice_core::conversation::{
    run_turns, ConversationTurn, VoiceConversation, VoiceEvent, VoiceListener,
};
use maria_voice_core::emotion::{EmotionAnalyzer, LexicalEmotionAnalyzer, PatternTable};
use maria_voice_core::playback::DummyPlaybackSink;
use maria_voice_core::profile::derive_profile;
use maria_voice_core::selector::{AdaptiveVoiceConfig, AdaptiveVoiceSelector};
use maria_voice_core::tts::{BasicTtsProvider, CartesiaProvider, TtsProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const GREETING: &str = "Hola, soy María. Estoy aquí para escucharte. ¿Cómo te sientes hoy?";
const ACKNOWLEDGEMENT: &str = "Te escucho. Cuéntame un poco más.";
const TURN_QUEUE: usize = 8;

#[derive(Parser, Debug)]
#[command(name = "maria-voice")]
#[command(about = "Emotion-adaptive voice selection for supportive conversations")]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true)]
    cartesia_api_key: Option<String>,

    #[arg(long, global = true)]
    cartesia_model: Option<String>,

    #[arg(long, global = true)]
    cartesia_voice_id: Option<String>,

    #[arg(long, global = true)]
    cartesia_language: Option<String>,

    /// Baseline speed in [-1.0, 1.0].
    #[arg(long, global = true, allow_hyphen_values = true)]
    baseline_speed: Option<f32>,

    /// Comma separated affect tags for the baseline voice.
    #[arg(long, global = true)]
    baseline_emotion: Option<String>,

    #[arg(long, global = true)]
    adaptive_voice: Option<bool>,

    /// JSON pattern table replacing the built-in Spanish lexicon.
    #[arg(long, global = true)]
    lexicon: Option<PathBuf>,

    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Clone, Debug)]
enum Command {
    /// Classify one utterance and print the derived voice as JSON.
    Analyze { text: String },
    /// Read utterances from stdin, one per line, and voice a reply to each.
    Converse,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let env = StdEnv;
    let command = args.command.clone();
    let cfg = build_config(args, &env)?;

    tracing::info!(
        backend = if cfg.cartesia.is_some() { "cartesia" } else { "basic" },
        adaptive_voice = cfg.adaptive_voice,
        "config loaded"
    );

    let analyzer = load_analyzer(&cfg)?;
    match command {
        Command::Analyze { text } => analyze(analyzer.as_ref(), &text),
        Command::Converse => converse(cfg, analyzer).await,
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_config(args: Args, env: &impl Env) -> anyhow::Result<AppConfig> {
    let cartesia = match resolve_api_key(args.cartesia_api_key, ENV_CARTESIA_API_KEY, env)? {
        Some(api_key) => Some(CartesiaConfig::new(
            api_key,
            resolve_string_with_default(
                args.cartesia_model,
                ENV_CARTESIA_MODEL,
                env,
                DEFAULT_CARTESIA_MODEL,
            ),
            resolve_string_with_default(
                args.cartesia_voice_id,
                ENV_CARTESIA_VOICE_ID,
                env,
                DEFAULT_CARTESIA_VOICE_ID,
            ),
            resolve_string_with_default(
                args.cartesia_language,
                ENV_CARTESIA_LANGUAGE,
                env,
                DEFAULT_CARTESIA_LANGUAGE,
            ),
        )?),
        None => None,
    };

    let speed = resolve_f32_with_default(
        args.baseline_speed,
        ENV_CARTESIA_SPEED,
        env,
        DEFAULT_BASELINE_SPEED,
    )?;
    let tags = resolve_optional_string(args.baseline_emotion, ENV_CARTESIA_EMOTION, env)
        .map(|raw| parse_affect_tags(&raw))
        .unwrap_or_default();

    Ok(AppConfig {
        cartesia,
        baseline: BaselineVoice::new(speed, tags)?,
        adaptive_voice: resolve_bool_with_default(
            args.adaptive_voice,
            ENV_ENABLE_ADAPTIVE_VOICE,
            env,
            true,
        )?,
        lexicon_path: args
            .lexicon
            .or_else(|| env.var(ENV_LEXICON_PATH).map(PathBuf::from)),
    })
}

fn load_analyzer(cfg: &AppConfig) -> anyhow::Result<Arc<dyn EmotionAnalyzer>> {
    match &cfg.lexicon_path {
        Some(path) => {
            let table = PatternTable::from_path(path)?;
            let analyzer = LexicalEmotionAnalyzer::from_table(&table)
                .with_context(|| format!("compiling lexicon {}", path.display()))?;
            tracing::info!(path = %path.display(), "custom lexicon loaded");
            let analyzer: Arc<dyn EmotionAnalyzer> = Arc::new(analyzer);
            Ok(analyzer)
        }
        None => {
            let analyzer: Arc<dyn EmotionAnalyzer> = LexicalEmotionAnalyzer::spanish();
            Ok(analyzer)
        }
    }
}

fn analyze(analyzer: &dyn EmotionAnalyzer, text: &str) -> anyhow::Result<()> {
    let signal = analyzer.analyze_text(text);
    let profile = derive_profile(&signal);
    let dominant = signal.dominant().map(|(category, intensity)| {
        serde_json::json!({ "category": category, "intensity": intensity })
    });

    let report = serde_json::json!({
        "signal": signal,
        "dominant": dominant,
        "summary": signal.summary(),
        "profile": profile,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

struct LogListener;

impl VoiceListener for LogListener {
    fn id(&self) -> &str {
        "log"
    }

    fn on_event(&self, event: &VoiceEvent) {
        match event {
            VoiceEvent::VoiceAdapted {
                description,
                emotion_summary,
            } => tracing::info!(%description, %emotion_summary, "voice adapted"),
            VoiceEvent::SpeechStarted { text } => tracing::debug!(%text, "speaking"),
            VoiceEvent::SpeechFinished { duration } => {
                tracing::debug!(duration_ms = duration.as_millis() as u64, "speech finished")
            }
            VoiceEvent::SynthesisFailed { error } => tracing::warn!(%error, "synthesis failed"),
        }
    }
}

async fn converse(cfg: AppConfig, analyzer: Arc<dyn EmotionAnalyzer>) -> anyhow::Result<()> {
    let provider: Arc<dyn TtsProvider> = match cfg.cartesia.clone() {
        Some(cartesia) => Arc::new(CartesiaProvider::new(cartesia)),
        None => Arc::new(BasicTtsProvider::new()),
    };
    let selector = AdaptiveVoiceSelector::new(
        analyzer,
        provider,
        AdaptiveVoiceConfig {
            enabled: cfg.adaptive_voice,
            baseline: cfg.baseline.to_profile(),
        },
    );

    let mut conversation = VoiceConversation::new(selector, DummyPlaybackSink::new());
    conversation.listeners_mut().register(Arc::new(LogListener));
    conversation.greet(GREETING).await?;

    let (tx, rx) = mpsc::channel(TURN_QUEUE);
    let turns = tokio::spawn(run_turns(conversation, rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if tx
            .send(ConversationTurn::new(line, ACKNOWLEDGEMENT))
            .await
            .is_err()
        {
            tracing::error!("conversation task stopped");
            break;
        }
    }
    drop(tx);

    let stats = turns.await.context("conversation task panicked")?;
    tracing::info!(spoken = stats.spoken, failed = stats.failed, "conversation ended");
    Ok(())
}
