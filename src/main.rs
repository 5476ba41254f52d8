// src/main.rs

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use lexviet::api_keys::ApiKeyProvider;
use lexviet::batch::{self, CancelToken};
use lexviet::config::{BatchRunConfig, ChatSettings, GenerationConfig};
use lexviet::providers::{self, ChatClient, OpenAiCompatibleClient};
use lexviet::{document, logging};

/// Structured-metadata extraction for Vietnamese legal documents.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level when RUST_LOG is not set.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a directory of PDFs to cleaned text files.
    Convert {
        #[arg(long)]
        input_dir: PathBuf,
        #[arg(long)]
        output_dir: PathBuf,
    },
    /// Build a CSV dataset from a directory of converted text files.
    Dataset {
        #[arg(long)]
        txt_dir: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Send one extraction request and print the response.
    Chat {
        /// Provider: openai, groq, or gemini.
        #[arg(long)]
        provider: String,
        #[arg(long)]
        model: String,
        /// Base URL override for OpenAI-compatible gateways.
        #[arg(long)]
        base_url: Option<String>,
        /// Message text; mutually exclusive with --file.
        #[arg(long, conflicts_with = "file")]
        message: Option<String>,
        /// Read the message from a file instead.
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long, default_value_t = 0.7)]
        temperature: f32,
        #[arg(long, default_value_t = 0.95)]
        top_p: f32,
        #[arg(long, default_value_t = 4096)]
        max_tokens: u32,
    },
    /// Batch extraction over a dataset slice.
    #[command(subcommand)]
    Batch(BatchCommand),
}

#[derive(Subcommand, Debug)]
enum BatchCommand {
    /// Submit a batch job from a TOML profile and wait for its results.
    Run {
        /// Path to the batch profile (see config docs for the schema).
        #[arg(long)]
        profile: PathBuf,
        /// Provider hosting the batch API: openai or groq.
        #[arg(long, default_value = "groq")]
        provider: String,
        /// Base URL override for OpenAI-compatible gateways.
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Re-run reconciliation from a submission file and a flattened result
    /// collection, without touching the provider.
    Merge {
        /// The batch_input_*.jsonl submission file.
        #[arg(long)]
        input_file: PathBuf,
        /// The converted_batch_results_*.json flat collection.
        #[arg(long)]
        converted: PathBuf,
        /// Field keys in submission order, comma separated.
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

fn parse_provider(name: &str) -> Result<ApiKeyProvider> {
    ApiKeyProvider::from_str(name)
        .with_context(|| format!("unknown provider '{name}' (expected openai, groq, or gemini)"))
}

fn batch_client(
    provider: ApiKeyProvider,
    model_name: &str,
    base_url: Option<String>,
) -> Result<OpenAiCompatibleClient> {
    let settings = ChatSettings {
        model_name: model_name.to_string(),
        base_url,
    };
    match provider {
        ApiKeyProvider::OpenAI => Ok(OpenAiCompatibleClient::new_openai(&settings)?),
        ApiKeyProvider::Groq => Ok(OpenAiCompatibleClient::new_groq(&settings)?),
        ApiKeyProvider::Gemini => {
            bail!("the Gemini API has no OpenAI-compatible batch endpoint; use openai or groq")
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match cli.command {
        Command::Convert {
            input_dir,
            output_dir,
        } => {
            let count = document::convert_pdf_dir(&input_dir, &output_dir)?;
            println!("converted {count} documents to {}", output_dir.display());
        }
        Command::Dataset { txt_dir, output } => {
            let count = batch::dataset::build_dataset_csv(&txt_dir, &output)?;
            println!("wrote {count} rows to {}", output.display());
        }
        Command::Chat {
            provider,
            model,
            base_url,
            message,
            file,
            temperature,
            top_p,
            max_tokens,
        } => {
            let provider = parse_provider(&provider)?;
            let message = match (message, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => bail!("provide --message or --file"),
            };
            let settings = ChatSettings {
                model_name: model,
                base_url,
            };
            let config = GenerationConfig {
                temperature,
                top_p,
                max_tokens,
            };
            let client = providers::chat_client_for(provider, &settings)?;
            let response = client.send(&message, &config)?;
            println!("{response}");
        }
        Command::Batch(BatchCommand::Run {
            profile,
            provider,
            base_url,
        }) => {
            let config = BatchRunConfig::from_toml_file(&profile)?;
            let provider = parse_provider(&provider)?;
            let client = batch_client(provider, &config.model_name, base_url)?;

            let outcome = batch::run_batch(&client, &config, &CancelToken::new())?;
            match outcome {
                batch::BatchRunOutcome::Completed {
                    batch_id,
                    merged_output,
                } => {
                    println!("batch {batch_id} completed: {}", merged_output.display());
                }
                batch::BatchRunOutcome::Failed {
                    batch_id,
                    status,
                    error_file,
                } => {
                    println!("batch {batch_id} failed with status {}", status.as_str());
                    if let Some(path) = error_file {
                        println!("error details: {}", path.display());
                    }
                    std::process::exit(1);
                }
            }
        }
        Command::Batch(BatchCommand::Merge {
            input_file,
            converted,
            columns,
            output_dir,
        }) => {
            if columns.is_empty() {
                bail!("--columns must name at least one field");
            }
            let objects = batch::results::read_converted(&converted)?;
            let responses = batch::results::response_entries(&objects);
            let output = batch::merge::merge_data(
                &input_file,
                &responses,
                &columns,
                output_dir.as_deref(),
            )?;
            println!("merged output written to {}", output.display());
        }
    }

    Ok(())
}
