use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use papertrail::generator::{
    DEFAULT_MAX_NEW_TOKENS, DEFAULT_REPLY_TOKENS, DEFAULT_TEMPERATURE, HfTokenCounter,
    TextGeneratorBuilder,
};
use papertrail::zotero::{self, ZoteroError};
use papertrail::{
    Conversation, OllamaClientBuilder, TextGenerator, Turn, ZeroShotClassifier,
};
use tracing::info;

/// papertrail - language model helpers and Zotero metadata extraction
#[derive(Parser)]
#[command(name = "papertrail")]
#[command(about = "Language model helpers and Zotero metadata extraction")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// List the collection names of a Zotero library
    Collections(DatabaseArgs),
    /// List the items of one Zotero collection
    Items(ItemsCommand),
    /// Continue a prompt with the language model
    Generate(GenerateCommand),
    /// Chat with the language model, one user turn per stdin line
    Chat(ChatCommand),
    /// Assign each text the best of the candidate labels
    Classify(ClassifyCommand),
}

#[derive(Args)]
struct DatabaseArgs {
    /// Path to zotero.sqlite (defaults to ~/Zotero/zotero.sqlite)
    #[arg(long, env = "ZOTERO_DB", value_name = "PATH")]
    db: Option<PathBuf>,
}

#[derive(Args)]
struct ItemsCommand {
    /// Exact collection name
    #[arg(value_name = "COLLECTION")]
    collection: String,

    #[command(flatten)]
    database: DatabaseArgs,

    /// Only list items that have an attachment folder
    #[arg(long)]
    require_attachment: bool,

    /// Print records as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ModelArgs {
    /// Model name (defaults to OLLAMA_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Path to a tokenizer.json used for exact token counts
    #[arg(long, env = "PAPERTRAIL_TOKENIZER", value_name = "PATH")]
    tokenizer: Option<PathBuf>,
}

#[derive(Args)]
struct GenerateCommand {
    /// Text to continue
    #[arg(value_name = "PROMPT")]
    prompt: String,

    #[arg(long, default_value_t = DEFAULT_MAX_NEW_TOKENS)]
    max_new_tokens: usize,

    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args)]
struct ChatCommand {
    #[arg(long, default_value_t = DEFAULT_REPLY_TOKENS)]
    max_tokens: usize,

    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args)]
struct ClassifyCommand {
    /// Comma-separated candidate labels
    #[arg(short, long, value_delimiter = ',', required = true)]
    labels: Vec<String>,

    /// Texts to classify
    #[arg(value_name = "TEXT", required = true)]
    texts: Vec<String>,

    /// Model name (defaults to OLLAMA_MODEL)
    #[arg(long)]
    model: Option<String>,
}

fn main() {
    let _ = dotenvy::dotenv();
    papertrail::logging::init();

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Collections(args) => handle_collections(args),
        Commands::Items(cmd) => handle_items(cmd),
        Commands::Generate(cmd) => handle_generate(cmd),
        Commands::Chat(cmd) => handle_chat(cmd),
        Commands::Classify(cmd) => handle_classify(cmd),
    };

    if let Err(e) = result {
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

/// Determines if an error is a user error (vs internal error).
///
/// User errors are a missing database file and empty input.
fn is_user_error(error: &anyhow::Error) -> bool {
    if let Some(ZoteroError::NotFound(_)) = error.downcast_ref::<ZoteroError>() {
        return true;
    }
    error.to_string().contains("cannot be empty")
}

fn resolve_database_path(args: &DatabaseArgs) -> Result<PathBuf> {
    args.db
        .clone()
        .or_else(zotero::default_database_path)
        .ok_or_else(|| anyhow::anyhow!("Failed to determine Zotero database path"))
}

fn handle_collections(args: &DatabaseArgs) -> Result<()> {
    let db_path = resolve_database_path(args)?;
    info!(path = %db_path.display(), "listing collections");

    for name in zotero::list_collections(&db_path)? {
        println!("{name}");
    }
    Ok(())
}

fn handle_items(cmd: &ItemsCommand) -> Result<()> {
    let db_path = resolve_database_path(&cmd.database)?;
    info!(path = %db_path.display(), collection = %cmd.collection, "listing items");

    let items = zotero::get_collection_items(&db_path, &cmd.collection, cmd.require_attachment)?;

    if cmd.json {
        let json = serde_json::to_string_pretty(&items).context("Failed to serialize items")?;
        println!("{json}");
        return Ok(());
    }

    for item in &items {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            item.item_id, item.year, item.authors, item.title, item.key
        );
    }
    Ok(())
}

/// Builds a generator from CLI model options and the environment.
fn build_generator(args: &ModelArgs) -> Result<TextGenerator> {
    let mut client_builder = OllamaClientBuilder::new();
    if let Some(model) = &args.model {
        client_builder = client_builder.model(model);
    }
    let client = client_builder
        .build()
        .context("Failed to create model client")?;
    let model = client.model().to_string();

    let mut builder = TextGeneratorBuilder::new()
        .client(Arc::new(client))
        .model(model);
    if let Some(path) = &args.tokenizer {
        let counter = HfTokenCounter::from_file(path)?;
        builder = builder.token_counter(Arc::new(counter));
    }

    Ok(builder.build()?)
}

fn handle_generate(cmd: &GenerateCommand) -> Result<()> {
    if cmd.prompt.trim().is_empty() {
        anyhow::bail!("Prompt cannot be empty");
    }

    let generator = build_generator(&cmd.model)?;
    let generation = generator
        .generate(&cmd.prompt, cmd.max_new_tokens, cmd.temperature)
        .context("Failed to generate text")?;

    println!("{}", generation.text());
    Ok(())
}

fn handle_chat(cmd: &ChatCommand) -> Result<()> {
    let generator = build_generator(&cmd.model)?;
    let mut conversation = Conversation::new();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read from stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        conversation.push(Turn::user(line));
        // Failures are shown as the error-flagged turn itself.
        let _ = generator.converse(&mut conversation, cmd.max_tokens, cmd.temperature);

        if let Some(turn) = conversation.last() {
            writeln!(stdout, "{}: {}", turn.role, turn.content)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn handle_classify(cmd: &ClassifyCommand) -> Result<()> {
    let labels: Vec<&str> = cmd
        .labels
        .iter()
        .map(|label| label.trim())
        .filter(|label| !label.is_empty())
        .collect();
    if labels.is_empty() {
        anyhow::bail!("Candidate labels cannot be empty");
    }

    let mut client_builder = OllamaClientBuilder::new();
    if let Some(model) = &cmd.model {
        client_builder = client_builder.model(model);
    }
    let client = client_builder
        .build()
        .context("Failed to create model client")?;
    let model = client.model().to_string();
    let classifier = ZeroShotClassifier::new(Arc::new(client), model);

    for (text, label) in cmd
        .texts
        .iter()
        .zip(classifier.classify_labels(&cmd.texts, &labels))
    {
        println!("{label}\t{text}");
    }
    Ok(())
}
