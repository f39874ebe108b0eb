//! Prosody Client
//!
//! Sends text to the Prosody server and speaks the returned segments with the
//! platform's speech synthesizer, each with its own pitch, rate and volume.
//!
//! Usage:
//!   # Interactive mode (type text, press Enter to direct and speak)
//!   cargo run --release -p prosody-client --features native-tts
//!
//!   # Single text mode
//!   cargo run --release -p prosody-client --features native-tts -- --text "Hello world"
//!
//!   # Print the segments without speaking
//!   cargo run --release -p prosody-client -- --text "Hello world" --silent

mod session;
mod speech;

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use session::Session;
use speech::{Speaker, TranscriptSpeaker};

#[derive(Parser, Debug)]
#[command(author, version, about = "Prosody Client")]
struct Args {
    /// Prosody endpoint URL
    #[arg(short, long, default_value = "http://127.0.0.1:3000/api/generateProsody")]
    server: String,

    /// Text to speak (if not provided, runs in interactive mode)
    #[arg(short, long)]
    text: Option<String>,

    /// Print the segments instead of speaking them
    #[arg(long)]
    silent: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("prosody_client=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let speaker = make_speaker(args.silent)?;
    let mut session = Session::new(&args.server, speaker);
    info!("Using endpoint {}", args.server);

    if let Some(text) = args.text {
        // Single text mode
        return Ok(session.speak_once(&text).await);
    }

    // Interactive mode
    println!("Prosody Client - Interactive Mode");
    println!("=================================");
    println!("Type text and press Enter to direct and speak it.");
    println!("Commands:");
    println!("  :q or :quit - Exit");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            break;
        }

        let line = line.trim();
        if line == ":q" || line == ":quit" {
            println!("Goodbye!");
            break;
        }

        if let Err(e) = session.speak_text(line).await {
            error!("Request failed: {:#}", e);
            println!("Error: {}", e);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn make_speaker(silent: bool) -> Result<Box<dyn Speaker>> {
    if silent {
        return Ok(Box::new(TranscriptSpeaker::new(io::stdout())));
    }

    #[cfg(feature = "native-tts")]
    {
        return Ok(Box::new(speech::NativeSpeaker::new()?));
    }

    #[cfg(not(feature = "native-tts"))]
    {
        tracing::warn!("Built without native-tts; printing segments instead of speaking");
        return Ok(Box::new(TranscriptSpeaker::new(io::stdout())));
    }
}
