//! ModelKit CLI binary.
//!
//! Inspect presets and exercise tokenizers from the command line.
//!
//! # Commands
//!
//! - `presets` - List registered presets
//! - `inspect` - Show a preset's configuration and layers
//! - `tokenize` - Encode text with a preset's tokenizer

use std::str::FromStr;

use clap::{Parser, Subcommand};
use modelkit::{preset::registry, TaskKind, Tokenizer, VERSION};

#[derive(Parser)]
#[command(name = "modelkit")]
#[command(author = "ModelKit Contributors")]
#[command(version = VERSION)]
#[command(about = "ModelKit - Pretrained model presets and tokenizers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered presets
    Presets {
        /// Filter by task kind (causal_lm, text_classifier)
        #[arg(short, long)]
        kind: Option<String>,

        /// Filter by model family
        #[arg(short, long)]
        family: Option<String>,
    },

    /// Show a preset's configuration and layers
    Inspect {
        /// Preset identifier (path, hf://..., kaggle://..., or name)
        preset: String,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Encode text with a preset's tokenizer
    Tokenize {
        /// Preset identifier (path, hf://..., kaggle://..., or name)
        preset: String,

        /// Text to encode
        text: String,

        /// Decode the ids back and print the text
        #[arg(short, long)]
        decode: bool,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Presets { kind, family } => cmd_presets(kind, family),

        Commands::Inspect { preset, verbose } => {
            init_logging(verbose);
            cmd_inspect(&preset)
        },

        Commands::Tokenize {
            preset,
            text,
            decode,
            verbose,
        } => {
            init_logging(verbose);
            cmd_tokenize(&preset, &text, decode)
        },
    }
}

fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();
}

fn cmd_presets(kind: Option<String>, family: Option<String>) -> anyhow::Result<()> {
    let kind = match kind.as_deref() {
        Some(value) => match TaskKind::from_str(value) {
            Ok(kind) => Some(kind),
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(1);
            },
        },
        None => None,
    };

    println!("{:<32} {:<12} {}", "Preset", "Family", "Handle");
    println!("{}", "-".repeat(76));

    for model_family in registry::global().iter() {
        if let Some(filter) = family.as_deref() {
            if model_family.name() != filter {
                continue;
            }
        }

        for entry in model_family.presets() {
            let include = match kind {
                None => true,
                // Backbone-level presets serve any kind the family supports;
                // task-level presets serve exactly their kind.
                Some(kind) => match entry.kind {
                    None => model_family.supports(kind),
                    Some(entry_kind) => entry_kind == kind,
                },
            };
            if include {
                println!(
                    "{:<32} {:<12} {}",
                    entry.name,
                    model_family.name(),
                    entry.handle
                );
            }
        }
    }

    Ok(())
}

fn cmd_inspect(preset: &str) -> anyhow::Result<()> {
    let loader = modelkit::loader_for(preset)?;
    let config = loader.backbone_config()?;

    println!("Preset: {preset}");
    println!("Family: {}", config.family);
    println!();
    println!("Backbone configuration:");
    println!("  Vocab size:       {}", config.vocab_size);
    println!("  Layers:           {}", config.num_layers);
    println!("  Heads:            {}", config.num_heads);
    println!("  Hidden dim:       {}", config.hidden_dim);
    println!("  Intermediate dim: {}", config.intermediate_dim);
    println!("  Max sequence:     {}", config.max_sequence_length);

    if let Some(task) = loader.task_config()? {
        println!();
        println!("Task: {}", task.kind);
        if let Some(classes) = task.num_classes {
            println!("  Classes: {classes}");
        }
        if let Some(training) = &task.training {
            println!(
                "  Training: {} (lr {}, loss {})",
                training.optimizer, training.learning_rate, training.loss
            );
        }
    }

    // Structure only; skip the weight download.
    let backbone = loader.load_backbone(false)?;
    println!();
    println!("{:<24} {:>12}", "Layer", "Params");
    println!("{}", "-".repeat(37));
    for layer in backbone.layers() {
        println!("{:<24} {:>12}", layer.name, layer.params);
    }
    println!("{}", "-".repeat(37));
    println!("{:<24} {:>12}", "Total", backbone.num_params());

    Ok(())
}

fn cmd_tokenize(preset: &str, text: &str, decode: bool) -> anyhow::Result<()> {
    let tokenizer = Tokenizer::from_preset(preset)?;
    let ids = tokenizer.encode(text)?;

    println!(
        "{}",
        ids.iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    );
    eprintln!(
        "{} tokens (vocabulary: {})",
        ids.len(),
        tokenizer.vocabulary_size()
    );

    if decode {
        println!("{}", tokenizer.decode(&ids)?);
    }

    Ok(())
}
