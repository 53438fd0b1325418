//! Interactive arbiter REPL.
//!
//! Reads user turns from stdin, classifies each against the configured
//! LLM endpoint, runs the arbitration pipeline, and prints the machine
//! directive plus add-ons. Development surface, not a delivery channel.

use anyhow::Result;
use clap::Parser;
use nela_shared::{DialogueTurn, NelaConfig, TraceWriter};
use nelad::classifier::LlmClassifier;
use nelad::store::{MemorySessionStore, SessionStore};
use nelad::turn::TurnEngine;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nelad", about = "Nela turn arbiter REPL", version)]
struct Args {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the classifier model
    #[arg(long)]
    model: Option<String>,

    /// Override the classifier endpoint URL
    #[arg(long)]
    url: Option<String>,

    /// User id for the session blob
    #[arg(long, default_value = "local-user")]
    user: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut config = NelaConfig::load_or_default(args.config.as_deref())?;
    if let Some(model) = args.model {
        config.classifier.model = model;
    }
    if let Some(url) = args.url {
        config.classifier.url = url;
    }

    let trace = TraceWriter::new(&config.trace.dir, config.trace.max_file_size);
    let engine = TurnEngine::new(config.arbiter.clone(), trace.clone());
    let classifier = LlmClassifier::new(config.classifier.clone());
    let store = MemorySessionStore::new();

    println!("nelad arbiter REPL - model {} - ctrl-d to exit", classifier.model());
    let stdin = io::stdin();
    let mut last_assistant: Option<String> = None;
    let mut recent: Vec<DialogueTurn> = vec![];

    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let user_text = line.trim();
        if user_text.is_empty() {
            continue;
        }

        let mut state = store.load(&args.user)?;
        let request =
            engine.build_request(&state, user_text, last_assistant.as_deref(), recent.clone());
        let output = match classifier.classify(&request).await {
            Ok(output) => output,
            Err(e) => {
                warn!("classifier unavailable, processing neutral turn: {}", e);
                trace.emit(
                    &args.user,
                    &nela_shared::TraceEvent::ClassifierFallback {
                        turn: state.turn + 1,
                        problems: vec![e.to_string()],
                    },
                );
                Default::default()
            }
        };

        let outcome = engine.process_turn(&mut state, output, user_text, &args.user, chrono::Utc::now());
        store.save(&args.user, &state)?;

        let mut reply = format!("[{:?}]", outcome.directive);
        if let Some(prefix) = &outcome.ack_prefix {
            reply = format!("{} {}", prefix, reply);
        }
        for addon in &outcome.addons {
            reply.push_str(&format!("\n  ({:?}) {}", addon.kind, addon.text));
        }
        println!("{}", reply);

        recent.push(DialogueTurn {
            user: user_text.to_string(),
            assistant: reply.clone(),
        });
        if recent.len() > 3 {
            recent.remove(0);
        }
        last_assistant = Some(reply);
    }
    Ok(())
}
