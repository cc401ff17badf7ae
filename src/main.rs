use anyhow::Result;
use clap::{Parser, ValueEnum};
use coinquery::OutputFormat;
use coinquery::log::init_logging;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Plain,
    Json,
    Markdown,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> OutputFormat {
        match format {
            Format::Plain => OutputFormat::Plain,
            Format::Json => OutputFormat::Json,
            Format::Markdown => OutputFormat::Markdown,
        }
    }
}

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The question to answer, e.g. "5 eth to usd"
    #[arg(required = true)]
    prompt: Vec<String>,

    /// Output rendering
    #[arg(short, long, value_enum, default_value = "plain")]
    format: Format,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long)]
    config_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let prompt = cli.prompt.join(" ");
    let result = coinquery::run(&prompt, cli.format.into(), cli.config_path.as_deref()).await;

    match result {
        Ok(answer) => {
            println!("{answer}");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Application failed");
            Err(e)
        }
    }
}
