use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::llm::config::DEFAULT_SYSTEM_PROMPT_TEMPLATE;
use crate::llm::{ClassificationResult, Classifier, ClassifierConfig, RelayClient};
use crate::relay::{KeySourcing, RelayConfig, CLASSIFY_PATH, DEFAULT_UPSTREAM_URL};

mod display;
mod export;
mod ingest;
mod llm;
mod relay;

/// Classify utterances into intents with an LLM, through a small HTTP relay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay that forwards prompts to the model provider
    Serve(ServeArgs),
    /// Classify utterances given on the command line
    Classify {
        #[command(flatten)]
        client: ClientArgs,

        /// Utterances to classify
        #[arg(required = true)]
        utterances: Vec<String>,
    },
    /// Classify every utterance in .csv/.txt files and export the results
    Batch {
        #[command(flatten)]
        client: ClientArgs,

        /// Input files, directories or glob patterns
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<String>,

        /// Where to write the CSV export
        #[arg(short, long, default_value = "classification_results.csv")]
        output: PathBuf,

        /// Pause after each request, in milliseconds
        #[arg(long, default_value_t = 500)]
        delay_ms: u64,
    },
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "RELAY_BIND", default_value = "127.0.0.1:8787")]
    bind: String,

    /// Whether callers send the provider key or the relay holds it
    #[arg(long, env = "RELAY_KEY_POLICY", value_enum, default_value = "caller")]
    key_policy: KeySourcing,

    /// Provider messages endpoint
    #[arg(long, env = "RELAY_UPSTREAM_URL", default_value = DEFAULT_UPSTREAM_URL)]
    upstream_url: String,
}

#[derive(Args, Debug)]
struct ClientArgs {
    /// Relay classify endpoint
    #[arg(long, env = "CLASSIFIER_RELAY_URL", default_value_t = default_relay_url())]
    relay_url: String,

    /// Provider API key sent with each request
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Free-text description of the domain the utterances come from
    #[arg(long, default_value = "")]
    context: String,

    /// File with a custom system prompt template; "{{context}}" is replaced by --context
    #[arg(long)]
    template_file: Option<PathBuf>,

    /// The relay holds the provider key; do not require --api-key
    #[arg(long)]
    relay_holds_key: bool,
}

fn default_relay_url() -> String {
    format!("http://127.0.0.1:8787{}", CLASSIFY_PATH)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level)?;

    match cli.command {
        Command::Serve(args) => {
            let config = RelayConfig::from_env_policy(args.key_policy, args.upstream_url);
            relay::serve(&args.bind, config).await
        }
        Command::Classify { client, utterances } => {
            let mut classifier = setup_classifier(&client)?;
            for utterance in &utterances {
                let result = classifier.classify(utterance).await;
                println!("{}", display::format_result(&result));
            }
            report_errors(classifier.results());
            Ok(())
        }
        Command::Batch {
            client,
            input,
            output,
            delay_ms,
        } => {
            let classifier = setup_classifier(&client)?.with_delay(Duration::from_millis(delay_ms));
            run_batch(classifier, &input, &output).await
        }
    }
}

fn setup_logging(log_level: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_names(false)
        .with_ansi(true)
        .with_timer(tracing_subscriber::fmt::time::LocalTime::rfc_3339())
        .with_level(true)
        .init();

    Ok(())
}

fn setup_classifier(args: &ClientArgs) -> Result<Classifier> {
    let template = match &args.template_file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read template file {}", path.display()))?,
        None => DEFAULT_SYSTEM_PROMPT_TEMPLATE.to_string(),
    };

    let config = ClassifierConfig::new(args.api_key.clone(), args.context.clone(), template)
        .with_relay_holds_key(args.relay_holds_key);

    if !config.has_key_path() {
        warn!("No API key configured; every classification will be reported as an error");
    }

    info!("Using relay at {}", args.relay_url);
    Ok(Classifier::new(config, RelayClient::new(args.relay_url.clone())))
}

async fn run_batch(mut classifier: Classifier, inputs: &[String], output: &Path) -> Result<()> {
    let files = ingest::collect_input_files(inputs)?;
    let utterances = ingest::load_utterances(&files)?;

    if utterances.is_empty() {
        warn!("No utterances to classify");
        return Ok(());
    }

    let results = classifier
        .classify_batch(&utterances, |progress| {
            info!("{} classified", display::format_progress(progress));
        })
        .await;

    for result in &results {
        println!("{}", display::format_result(result));
    }
    report_errors(&results);

    export::write_csv(output, classifier.results())?;
    println!("\n\x1b[1;33mResults written to {}\x1b[0m", output.display());

    Ok(())
}

fn report_errors(results: &[ClassificationResult]) {
    let failed = results.iter().filter(|r| r.is_error()).count();
    if failed > 0 {
        warn!("{} of {} utterances could not be classified", failed, results.len());
    }
}
