use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tender_extract_core::{
    build_prompt, chunk_text, collect_sources, ChunkingConfig, CriteriaSchema, DocumentResultSet,
    GeminiTransport, LopdfExtractor, PdfTextExtractor, PipelineOptions, TenderAnalyzer,
    DocumentSource, DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_URL, PARAGRAPH_SEPARATOR,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "tender-extract", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini model name
    #[arg(long, env = "TENDER_LLM_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    model: String,

    /// Gemini API base URL
    #[arg(long, default_value = DEFAULT_GEMINI_URL)]
    gemini_url: String,

    /// Pipeline options file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Extract criteria from PDF files or folders of PDFs.
    Analyze {
        /// PDF files or folders searched recursively.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Custom criteria schema (JSON).
        #[arg(long)]
        criteria: Option<PathBuf>,
        /// Token budget per chunk.
        #[arg(long)]
        max_tokens: Option<usize>,
        /// Documents analyzed concurrently.
        #[arg(long)]
        concurrency: Option<usize>,
        /// Include chunk counts, failed chunks and conflicts.
        #[arg(long, default_value_t = false)]
        detailed: bool,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        /// Write the report to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the text extracted from a PDF.
    Text { pdf: PathBuf },
    /// Print the prompt built for each chunk of a text file without calling the LLM.
    Prompt {
        text_file: PathBuf,
        #[arg(long)]
        criteria: Option<PathBuf>,
        #[arg(long)]
        max_tokens: Option<usize>,
    },
    /// Print the active criteria schema.
    Criteria {
        #[arg(long)]
        criteria: Option<PathBuf>,
        /// List category paths instead of the JSON schema.
        #[arg(long, default_value_t = false)]
        paths: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Table,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "tender-extract boot"
    );

    let mut options = load_options(cli.config.as_deref()).await?;

    match cli.command {
        Command::Analyze {
            paths,
            criteria,
            max_tokens,
            concurrency,
            detailed,
            format,
            output,
        } => {
            if let Some(max_tokens) = max_tokens {
                options.max_chunk_tokens = max_tokens;
            }
            if let Some(concurrency) = concurrency {
                options.document_concurrency = concurrency;
            }

            let criteria = load_criteria(criteria.as_deref())?;
            let sources = collect_sources(&paths)?;

            let transport =
                GeminiTransport::new(cli.api_key, cli.model).with_endpoint(cli.gemini_url);
            if !transport.has_credential() {
                warn!("GEMINI_API_KEY is not set; every document will fail");
            }

            let analyzer =
                TenderAnalyzer::new(transport, LopdfExtractor, Arc::new(criteria), options)?;

            let cancel = analyzer.cancel_flag();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling remaining work");
                    cancel.cancel();
                }
            });

            info!(documents = sources.len(), "analyzing");
            let results = analyzer.analyze_batch(sources).await;

            let rendered = match format {
                OutputFormat::Json => serde_json::to_string_pretty(&results.to_json(detailed))?,
                OutputFormat::Table => render_table(&results),
            };

            match output {
                Some(path) => {
                    tokio::fs::write(&path, rendered)
                        .await
                        .with_context(|| format!("writing report to {}", path.display()))?;
                    info!(path = %path.display(), "report written");
                }
                None => println!("{rendered}"),
            }

            if !results.is_empty() && results.succeeded() == 0 {
                anyhow::bail!("no document was analyzed successfully");
            }
        }
        Command::Text { pdf } => {
            let text = LopdfExtractor
                .extract_text(&DocumentSource::from_path(pdf))
                .await?;
            println!("{text}");
        }
        Command::Prompt {
            text_file,
            criteria,
            max_tokens,
        } => {
            if let Some(max_tokens) = max_tokens {
                options.max_chunk_tokens = max_tokens;
            }
            options.validate()?;

            let criteria = load_criteria(criteria.as_deref())?;
            let text = tokio::fs::read_to_string(&text_file)
                .await
                .with_context(|| format!("reading {}", text_file.display()))?;

            let chunks = chunk_text(&text, ChunkingConfig::from(&options));
            for (index, chunk) in chunks.iter().enumerate() {
                println!("--- chunk {} of {} ---", index + 1, chunks.len());
                println!("{}", build_prompt(chunk, &criteria)?);
                print!("{PARAGRAPH_SEPARATOR}");
            }
        }
        Command::Criteria { criteria, paths } => {
            let criteria = load_criteria(criteria.as_deref())?;
            if paths {
                for path in criteria.leaf_paths() {
                    println!("{}", path.join(" > "));
                }
            } else {
                println!("{}", criteria.to_pretty_json()?);
            }
        }
    }

    Ok(())
}

async fn load_options(path: Option<&Path>) -> anyhow::Result<PipelineOptions> {
    let Some(path) = path else {
        return Ok(PipelineOptions::default());
    };

    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config {}", path.display()))?;
    let options = PipelineOptions::from_toml(&raw)?;
    info!(path = %path.display(), "loaded pipeline options");
    Ok(options)
}

fn load_criteria(path: Option<&Path>) -> anyhow::Result<CriteriaSchema> {
    match path {
        Some(path) => CriteriaSchema::from_path(path)
            .with_context(|| format!("loading criteria {}", path.display())),
        None => Ok(CriteriaSchema::tender_default()),
    }
}

fn render_table(results: &DocumentResultSet) -> String {
    let mut lines = Vec::new();
    for (document, outcome) in results.iter() {
        lines.push(format!("== {document} =="));
        match outcome {
            Ok(report) => {
                let rows = report.result.flatten();
                if rows.is_empty() {
                    lines.push("  (no criteria found)".to_string());
                }
                for (path, value) in rows {
                    lines.push(format!("  {path}: {}", display_value(&value)));
                }
                if !report.failures.is_empty() {
                    lines.push(format!(
                        "  ({} of {} chunk(s) failed)",
                        report.failures.len(),
                        report.chunk_count
                    ));
                }
            }
            Err(message) => lines.push(format!("  error: {message}")),
        }
    }
    lines.join("\n")
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(display_value).collect::<Vec<_>>().join("; "),
        other => other.to_string(),
    }
}
