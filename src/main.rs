use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use tutor_mascot::backend::{BackendServer, EchoAnswerer};
use tutor_mascot::voice::{
    AudioCapture, CloudSpeechEngine, MicrophoneRecognizer, SpeechToText, TextToSpeech, rms,
};
use tutor_mascot::{
    APOLOGY, Config, IgnoreReason, InferenceClient, PlaybackEvent, Role, Speaker, TurnCoordinator,
    TurnOutcome, ui,
};

/// Mascot - voice front end for a question-answering tutor
#[derive(Parser)]
#[command(name = "mascot", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Talk to the mascot (Enter to speak, or type a question)
    Run,
    /// Ask one typed question
    Ask {
        /// The question
        question: String,
    },
    /// Speak text aloud
    Say {
        /// Text to speak
        #[arg(default_value = "Hi! I'm your tutor. Ask me anything.")]
        text: String,
    },
    /// List the speech engine's voices
    Voices,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Run the development backend
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,tutor_mascot=info",
        1 => "info,tutor_mascot=debug",
        2 => "debug",
        _ => "trace",
    };

    // stdout belongs to the conversation view
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => interactive(&config).await,
        Command::Ask { question } => ask(&config, &question).await,
        Command::Say { text } => say(&config, &text).await,
        Command::Voices => {
            list_voices(&config);
            Ok(())
        }
        Command::TestMic { duration } => test_mic(duration).await,
        Command::Serve { port } => {
            let port = port.unwrap_or(config.server.port);
            BackendServer::new(
                Arc::new(EchoAnswerer),
                port,
                config.server.allowed_origins.clone(),
            )
            .run()
            .await?;
            Ok(())
        }
    }
}

fn build_speaker(config: &Config) -> Speaker {
    let tts = TextToSpeech::new(
        &config.voice.tts_url,
        config.api_keys.openai.clone(),
        config.voice.tts_model.clone(),
    );
    let engine = CloudSpeechEngine::new(tts, config.voice.voices.clone());
    Speaker::new(
        Arc::new(engine),
        config.voice.prosody,
        config.voice.preferred_voices.clone(),
    )
}

fn build_coordinator(config: &Config) -> Arc<TurnCoordinator> {
    let stt = SpeechToText::new(
        &config.voice.stt_url,
        config.api_keys.openai.clone(),
        config.voice.stt_model.clone(),
        config.voice.language.clone(),
    );
    let recognizer = MicrophoneRecognizer::new(stt, config.capture.clone());
    let inference = InferenceClient::new(&config.api_url);

    tracing::info!(
        api_url = %config.api_url,
        policy = %config.mascot.failed_turn_policy,
        "mascot ready"
    );

    Arc::new(TurnCoordinator::new(
        Arc::new(recognizer),
        Arc::new(inference),
        build_speaker(config),
        &config.mascot,
    ))
}

fn report(outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Ignored(IgnoreReason::Busy(status)) => {
            println!("(busy: {status}, try again in a moment)");
        }
        TurnOutcome::Ignored(IgnoreReason::Closed) | TurnOutcome::Completed => {}
        TurnOutcome::Interrupted => tracing::debug!("turn interrupted"),
        TurnOutcome::Failed(e) => tracing::warn!(error = %e, "turn failed"),
    }
}

/// Terminal conversation loop
async fn interactive(config: &Config) -> anyhow::Result<()> {
    let coordinator = build_coordinator(config);
    let renderer = ui::spawn_renderer(&coordinator);

    println!("{}", ui::render_status_line(&coordinator.snapshot()));
    println!("Press Enter to speak, type a question, or 'quit' to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }

        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            let outcome = if line.is_empty() {
                coordinator.listen().await
            } else {
                coordinator.submit(&line).await
            };
            report(&outcome);
        });
    }

    coordinator.close();
    drop(coordinator);
    renderer.abort();
    Ok(())
}

async fn ask(config: &Config, question: &str) -> anyhow::Result<()> {
    let coordinator = build_coordinator(config);

    let outcome = coordinator.submit(question).await;
    let snapshot = coordinator.snapshot();

    if let Some(turn) = snapshot.log.iter().rev().find(|t| t.role == Role::Assistant) {
        println!("{}", ui::render_log_line(turn));
    }

    match outcome {
        TurnOutcome::Failed(e) => {
            println!("{APOLOGY}");
            Err(anyhow::anyhow!("{e}"))
        }
        _ => Ok(()),
    }
}

async fn say(config: &Config, text: &str) -> anyhow::Result<()> {
    let speaker = build_speaker(config);
    if let Some(voice) = speaker.selected_voice() {
        println!("Voice: {} ({})", voice.name, voice.lang);
    }

    let mut events = speaker.speak(text);
    while let Some(event) = events.recv().await {
        match event {
            PlaybackEvent::Started => println!("Speaking..."),
            PlaybackEvent::Ended => println!("Done."),
            PlaybackEvent::Failed(e) => anyhow::bail!("playback failed: {e}"),
        }
    }
    Ok(())
}

fn list_voices(config: &Config) {
    let speaker = build_speaker(config);
    let selected = speaker.selected_voice();

    for voice in speaker.voices() {
        let marker = if selected.as_ref() == Some(&voice) { "*" } else { " " };
        println!("{marker} {:<20} {}", voice.name, voice.lang);
    }
}

async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.peek_buffer();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]", i + 1);

        capture.clear_buffer();
    }

    capture.stop();

    println!("\n---");
    println!("Speech starts registering above an RMS of about 0.03.");
    println!("If the meter stayed near 0, check the default input device and its level.");

    Ok(())
}
