use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser};
use pdfrag::chain::build_chain;
use pdfrag::chat::run_chat;
use pdfrag::config::{load_dotenv, SettingsArgs};
use pdfrag::logging::init_logging;
use tracing::{error, info};

const START_FAILURE: &str =
    "Não foi possível iniciar o chat. Verifique os erros de inicialização.";

#[derive(Parser, Debug)]
#[command(
    name = "pdfrag-chat",
    about = "Answer questions about the ingested PDF using only the stored context"
)]
struct ChatCli {
    #[command(flatten)]
    settings: SettingsArgs,

    /// Answer a single question and exit instead of starting the prompt loop
    #[arg(long)]
    question: Option<String>,

    /// Only print the retrieved context (skip the chat model call)
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<ExitCode> {
    load_dotenv()?;
    let cli = ChatCli::parse();
    init_logging(cli.verbose);
    let settings = cli.settings.into_settings()?;

    let chain = match build_chain(&settings) {
        Ok(chain) => chain,
        Err(err) => {
            error!(error = %format!("{err:#}"), "failed to initialise chat");
            println!("{START_FAILURE}");
            return Ok(ExitCode::FAILURE);
        }
    };

    if let Some(question) = cli.question.as_deref() {
        if cli.dry_run {
            let context = chain.context_for(question)?;
            println!("--- Retrieved Context ---\n{context}\n");
            println!("dry-run enabled; skipping chat model call.");
        } else {
            println!("RESPOSTA: {}", chain.invoke(question)?);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    let answered = if cli.dry_run {
        run_chat(stdin.lock(), stdout.lock(), |question| {
            chain.context_for(question)
        })?
    } else {
        run_chat(stdin.lock(), stdout.lock(), |question| chain.invoke(question))?
    };
    info!(answered, "chat session finished");
    Ok(ExitCode::SUCCESS)
}
