#[cfg(feature = "cli")]
use anyhow::Context;
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use dotenvy::dotenv;
#[cfg(feature = "cli")]
use std::sync::Arc;
#[cfg(feature = "cli")]
use warehouse_copilot::{
    completion::ChatClient,
    config::Config,
    context_engine::ContextBuilder,
    enrichment::MetadataEnricher,
    learning::LearningSink,
    metadata::MetadataStore,
    refinement::QueryProcessor,
    repl::InteractiveSession,
    search::KnowledgeBaseClient,
    telemetry,
    executor::WarehouseClient,
};

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "warehouse-copilot", about = "Natural-language SQL assistant for the data warehouse")]
struct Cli {
    /// Start the interactive query session
    #[arg(long)]
    interactive: bool,

    /// Build the metadata and learnings knowledge bases from disk
    #[arg(long)]
    create_kb: bool,

    /// Rebuild the learnings knowledge base from the learnings log
    #[arg(long)]
    refresh_learnings: bool,

    /// Enrich a raw metadata catalog with AI descriptions and write the
    /// result to the configured metadata file
    #[arg(long, value_name = "FILE")]
    enrich_catalog: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let cli = Cli::parse();
    telemetry::init_tracing(cli.verbose, cli.interactive);

    let config = Config::from_env()?;

    if let Some(raw_catalog) = &cli.enrich_catalog {
        enrich_catalog(&config, raw_catalog).await?;
        return Ok(());
    }

    if cli.create_kb {
        create_knowledge_bases(&config).await?;
        return Ok(());
    }

    if cli.refresh_learnings {
        refresh_learnings(&config).await?;
        return Ok(());
    }

    if cli.interactive {
        run_interactive(&config, cli.verbose).await?;
        return Ok(());
    }

    anyhow::bail!(
        "no action selected; use --interactive, --create-kb, --refresh-learnings \
         or --enrich-catalog (see --help)"
    );
}

#[cfg(feature = "cli")]
async fn run_interactive(config: &Config, verbose: bool) -> anyhow::Result<()> {
    let search = Arc::new(KnowledgeBaseClient::new(config));
    let backend = Arc::new(ChatClient::new(config));
    let context_builder = ContextBuilder::new(search, config);
    let sink = LearningSink::new(&config.learnings_file);
    let processor = QueryProcessor::new(context_builder, backend, sink, config);
    let executor = Arc::new(WarehouseClient::new(config));

    let mut session = InteractiveSession::new(processor, executor, verbose);
    session.run().await
}

#[cfg(feature = "cli")]
async fn create_knowledge_bases(config: &Config) -> anyhow::Result<()> {
    let store = MetadataStore::load(&config.metadata_file).with_context(|| {
        format!(
            "metadata catalog not found at {}; run --enrich-catalog first",
            config.metadata_file
        )
    })?;

    let client = KnowledgeBaseClient::new(config);
    client.create_knowledge_base(&store).await?;
    println!("✅ Metadata knowledge base built ({} columns)", store.len());

    refresh_learnings(config).await
}

#[cfg(feature = "cli")]
async fn refresh_learnings(config: &Config) -> anyhow::Result<()> {
    let sink = LearningSink::new(&config.learnings_file);
    let records = sink.parse_log()?;

    let client = KnowledgeBaseClient::new(config);
    client.rebuild_learnings(&records).await?;
    println!("✅ Learnings knowledge base rebuilt ({} entries)", records.len());
    Ok(())
}

#[cfg(feature = "cli")]
async fn enrich_catalog(config: &Config, raw_catalog: &str) -> anyhow::Result<()> {
    use std::fmt::Write as _;

    let store = MetadataStore::load(raw_catalog)
        .with_context(|| format!("failed to load raw catalog {raw_catalog}"))?;

    let backend = Arc::new(ChatClient::new(config));
    let enricher =
        MetadataEnricher::new(backend, config.enrich_workers, config.enrich_pacing_ms);
    let enriched = enricher.enrich(store.records().to_vec()).await;

    let mut output = String::new();
    for record in &enriched {
        let line = serde_json::to_string(record)?;
        writeln!(output, "{line}")?;
    }
    if let Some(parent) = std::path::Path::new(&config.metadata_file).parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config.metadata_file, output)
        .with_context(|| format!("failed to write {}", config.metadata_file))?;

    println!(
        "✅ Enriched {} columns, wrote {}",
        enriched.len(),
        config.metadata_file
    );
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
