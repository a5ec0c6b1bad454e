use std::sync::Arc;

use anyhow::Context;
use askqa_rag::{
    BuildReport, FileVectorStore, IndexBuilder, NormalizedEmbedder, Settings,
    openai::OpenAIEmbeddingProvider,
};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::server::{ServerConfig, run_server};

/// Question answering over an archive of prior Q&A records.
#[derive(Debug, Parser)]
#[command(name = "askqa", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Rebuild the vector collection from the source data directory
    BuildDb,
    /// Serve the question answering API
    RunApp {
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::from_env().context("failed to load configuration")?;

    match cli.command {
        Commands::BuildDb => {
            let report = build_db(&settings).await?;
            println!(
                "Built DB '{}' with {} chunks from {} unique questions.",
                settings.collection_name, report.chunks, report.questions
            );
            Ok(())
        }
        Commands::RunApp { host, port } => run_server(settings, ServerConfig { host, port }).await,
    }
}

pub async fn build_db(settings: &Settings) -> anyhow::Result<BuildReport> {
    info!(
        data_dir = %settings.data_dir.display(),
        persist_dir = %settings.persist_dir.display(),
        collection = %settings.collection_name,
        "building collection"
    );

    let embedder = NormalizedEmbedder::new(Arc::new(
        OpenAIEmbeddingProvider::from_settings(settings).context("invalid embedding settings")?,
    ));
    let store = Arc::new(
        FileVectorStore::open(&settings.persist_dir).with_context(|| {
            format!("cannot open index directory {}", settings.persist_dir.display())
        })?,
    );

    IndexBuilder::new(settings, embedder, store).run().await.context("database build failed")
}
