//! Annotator command line
//!
//! Drives the core against XHTML snapshots on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use annotator_core::anchor::{
    find_across_nodes, ChecksumRangeSerializer, FindOptions, PositionCodec, RangeSerializer,
    ResolutionChain,
};
use annotator_core::annotations::{AnnotationStore, SqliteStore};
use annotator_core::dom::{outer_html, parse_xhtml};
use annotator_core::telemetry::init_tracing;
use annotator_core::{AnchorConfig, Annotator, PageSession, SessionEvent};

#[derive(Parser)]
#[command(name = "annotator")]
#[command(about = "Anchor annotations to page snapshots and paint them again")]
struct Cli {
    /// Annotation database
    #[arg(long, env = "ANNOTATOR_DATABASE_URL", default_value = "sqlite:./annotations.db")]
    database_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Anchor the first occurrence of some text and save it
    Annotate {
        /// Page the snapshot was taken from
        page_url: String,
        /// XHTML snapshot of the page
        file: PathBuf,
        /// Text to annotate
        text: String,
    },
    /// Run a page session and print the decorated body
    Highlight {
        /// Page the snapshot was taken from
        page_url: String,
        /// XHTML snapshot of the page
        file: PathBuf,
    },
    /// Print stored annotations as JSON
    List {
        /// Only annotations on this page
        page_url: Option<String>,
    },
}

fn read_snapshot(file: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("annotator_core=info");
    let cli = Cli::parse();

    let mut config = AnchorConfig::load().context("Invalid ANNOTATOR_* configuration")?;
    config.store.database_url = cli.database_url;
    let store: Arc<dyn AnnotationStore> = Arc::new(
        SqliteStore::connect(&config.store.database_url)
            .await
            .with_context(|| format!("Failed to open {}", config.store.database_url))?,
    );
    let serializer: Arc<dyn RangeSerializer> = Arc::new(ChecksumRangeSerializer::new());
    let decorations = config.painter.correlation_attribute.clone();

    match cli.command {
        Commands::Annotate { page_url, file, text } => {
            let doc = parse_xhtml(&read_snapshot(&file)?)?.into_shared();
            let selection = find_across_nodes(&doc.lock(), &text, FindOptions::default());
            if selection.is_none() {
                bail!("\"{}\" does not occur in {}", text, file.display());
            }

            let codec = PositionCodec::new()
                .with_serializer(serializer)
                .with_decoration_attribute(&decorations);
            let annotator = Annotator::new(codec, store);
            let annotation = annotator.annotate_selection(&page_url, &doc, selection).await?;
            println!("{}", serde_json::to_string_pretty(&annotation)?);
        }
        Commands::Highlight { page_url, file } => {
            let markup = read_snapshot(&file)?;
            let chain = ResolutionChain::configured(Some(serializer), &decorations);
            let (session, handle, mut events) =
                PageSession::from_markup(&page_url, &markup, store, chain, config)?;
            let doc = session.document();
            let task = session.spawn();

            while let Some(event) = events.recv().await {
                eprintln!("{}", serde_json::to_string(&event)?);
                if matches!(event, SessionEvent::Settled { .. }) {
                    break;
                }
            }
            handle.shutdown();
            task.await?;

            let doc = doc.lock();
            println!("{}", outer_html(&doc, doc.body()));
        }
        Commands::List { page_url: None } => {
            println!("{}", serde_json::to_string_pretty(&store.all().await?)?);
        }
        Commands::List { page_url: Some(page_url) } => {
            let annotations = store.get(&page_url).await?;
            info!("{} annotations on {}", annotations.len(), page_url);
            println!("{}", serde_json::to_string_pretty(&annotations)?);
        }
    }

    Ok(())
}
