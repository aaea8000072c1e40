use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser};
use pdfrag::config::{load_dotenv, SettingsArgs};
use pdfrag::embedder::GeminiEmbedder;
use pdfrag::ingest::ingest_pdf;
use pdfrag::logging::init_logging;
use pdfrag::vector_store::PgVectorStore;
use pdfrag::RecursiveSplitter;

#[derive(Parser, Debug)]
#[command(
    name = "pdfrag-ingest",
    about = "Split a PDF into chunks, embed them with Gemini and store them in pgvector"
)]
struct IngestCli {
    #[command(flatten)]
    settings: SettingsArgs,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    load_dotenv()?;
    let cli = IngestCli::parse();
    init_logging(cli.verbose);
    let settings = cli.settings.into_settings()?;

    let pdf_path = settings
        .pdf_path
        .clone()
        .filter(|path| !path.as_os_str().is_empty())
        .ok_or_else(|| anyhow!("PDF_PATH must point at the PDF to ingest"))?;
    let splitter = RecursiveSplitter::new(settings.chunking)?;

    let report = ingest_pdf(&pdf_path, &splitter, settings.id_scheme, || {
        let embedder = GeminiEmbedder::from_settings(&settings)
            .context("failed to create embedding client")?;
        PgVectorStore::connect(&settings, embedder).context("failed to open vector store")
    })?;

    println!(
        "Successfully stored {} chunk{} from {} page{} of {} in collection '{}'.",
        report.stored,
        if report.stored == 1 { "" } else { "s" },
        report.pages,
        if report.pages == 1 { "" } else { "s" },
        pdf_path.display(),
        settings.collection_name
    );
    Ok(())
}
