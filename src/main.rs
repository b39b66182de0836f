//! multihop - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

use multihop_rag::{
    cli::{Args, Commands, Verbosity},
    config::Config,
    engine::QueryEngine,
    ingest::document_from_path,
    orchestration::ReasoningState,
    providers::OllamaClient,
    schema::{LlmStructureAnalyzer, PatternRegistry, SchemaCache, SchemaResolver},
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let verbosity = args.verbosity();
    init_tracing(verbosity.tracing_level());

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match args.command {
        Commands::Ask {
            question,
            max_iterations,
            json,
        } => ask(config, &question, max_iterations, json, verbosity).await,
        Commands::Ingest { files } => ingest(config, &files, verbosity).await,
        Commands::Resolve { file } => resolve(config, &file).await,
        Commands::Patterns { dir, export } => patterns(&config, dir.as_deref(), export.as_deref()),
    }
}

fn spinner(verbosity: Verbosity, message: &str) -> Option<ProgressBar> {
    if verbosity == Verbosity::Quiet {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

async fn ask(
    mut config: Config,
    question: &str,
    max_iterations: Option<usize>,
    json: bool,
    verbosity: Verbosity,
) -> Result<()> {
    if let Some(limit) = max_iterations {
        config.reasoning.max_iterations = limit;
    }
    let engine = QueryEngine::from_config(config)
        .await
        .context("Failed to start query engine")?;

    let pb = spinner(verbosity, "Reasoning...");
    let outcome = engine.answer(question).await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let state = outcome.context("Reasoning run failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }
    if verbosity.show_steps() {
        print_steps(&state);
    }
    match &state.final_answer {
        Some(answer) => println!("{}", answer),
        None => println!("{}", "No answer produced.".yellow()),
    }
    Ok(())
}

fn print_steps(state: &ReasoningState) {
    for past in &state.past_steps {
        println!(
            "{} {} {}",
            format!("[{}]", past.step_index + 1).cyan(),
            past.step.sub_question.bold(),
            format!("({} docs, {}ms)", past.documents.len(), past.elapsed_ms).dimmed()
        );
        for finding in &past.key_findings {
            println!("    - {}", finding);
        }
    }
    println!();
}

async fn ingest(config: Config, files: &[std::path::PathBuf], verbosity: Verbosity) -> Result<()> {
    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        documents.push(
            document_from_path(file).with_context(|| format!("Failed to read {}", file.display()))?,
        );
    }

    let engine = QueryEngine::from_config(config)
        .await
        .context("Failed to start query engine")?;

    let pb = spinner(verbosity, &format!("Ingesting {} document(s)...", documents.len()));
    let report = engine.ingest(documents).await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    for ingested in &report.succeeded {
        println!(
            "{} {} ({} chunks, {}{})",
            "✓".green(),
            ingested.document_id,
            ingested.chunks,
            ingested.strategy,
            ingested
                .pattern_name
                .as_deref()
                .map(|name| format!(": {}", name))
                .unwrap_or_default()
        );
    }
    for failure in &report.failed {
        println!("{} {}: {}", "✗".red(), failure.document_id, failure.error);
    }

    if !report.is_clean() {
        anyhow::bail!("{} document(s) failed to ingest", report.failed.len());
    }
    Ok(())
}

async fn resolve(config: Config, file: &std::path::Path) -> Result<()> {
    let document =
        document_from_path(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let generator = Arc::new(OllamaClient::with_timeout(
        &config.ollama.url,
        &config.ollama.chat_model,
        &config.ollama.embed_model,
        config.request_timeout(),
    )?);
    let registry = Arc::new(load_registry(&config, None));
    let resolver = SchemaResolver::new(
        registry,
        Arc::new(SchemaCache::new(config.cache_ttl())),
        Arc::new(LlmStructureAnalyzer::new(generator).with_max_chars(config.schema.max_analysis_chars)),
    )
    .with_match_threshold(config.schema.match_threshold);

    let result = resolver
        .resolve(&document.document_id, &document.content, &document.format, None)
        .await
        .context("Schema resolution failed")?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn load_registry(config: &Config, extra_dir: Option<&std::path::Path>) -> PatternRegistry {
    let registry = PatternRegistry::with_defaults();
    for dir in config.schema.patterns_dir.as_deref().into_iter().chain(extra_dir) {
        if let Err(e) = registry.load_dir(dir) {
            eprintln!("{} {}: {}", "warning:".yellow(), dir.display(), e);
        }
    }
    registry
}

fn patterns(
    config: &Config,
    dir: Option<&std::path::Path>,
    export: Option<&std::path::Path>,
) -> Result<()> {
    let registry = load_registry(config, dir);

    for pattern in registry.ordered() {
        println!(
            "{:<20} {:>3}  {}",
            pattern.name.bold(),
            pattern.priority,
            pattern.description
        );
    }

    if let Some(out) = export {
        for pattern in registry.ordered() {
            let path = registry.save_pattern(&pattern.name, out)?;
            println!("{} {}", "wrote".green(), path.display());
        }
    }
    Ok(())
}
