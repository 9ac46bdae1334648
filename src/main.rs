use clap::{command, Parser};
use std::path::PathBuf;
use std::sync::Arc;

use captiongenie::{
    config::{AnalyzerKind, AppConfig, Provider},
    logging,
    shell::StdoutClipboard,
    CaptionResponse, CaptionSession,
};

#[derive(Parser, Debug)]
#[command(name = "captiongenie", about = "Generate social media captions for a photo")]
struct Cli {
    #[arg(value_name = "IMAGE", index = 1)]
    image: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, value_enum)]
    provider: Option<Provider>,

    #[arg(short, long)]
    model: Option<String>,

    #[arg(short, long, value_enum)]
    analyzer: Option<AnalyzerKind>,

    /// Copy caption number N (1-based) instead of listing all of them
    #[arg(long, value_name = "N")]
    copy: Option<usize>,

    /// Print the captions as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_tracing();
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(provider) = cli.provider {
        if provider != config.provider {
            config.model = None;
        }
        config.provider = provider;
    }
    if let Some(model) = cli.model {
        config.model = Some(model);
    }
    if let Some(analyzer) = cli.analyzer {
        config.analyzer = analyzer;
    }

    let llm = config.create_llm_client()?;
    let pipeline = Arc::new(config.build_pipeline(llm)?);
    let session = CaptionSession::new(pipeline);

    session.select_image_file(&cli.image).await?;

    if let Err(e) = session.generate_captions().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let captions = session.captions();
    match cli.copy {
        Some(n) => {
            let index = n.checked_sub(1).ok_or("caption numbers start at 1")?;
            session.copy_caption(index, &StdoutClipboard)?;
            for notice in session.notices() {
                eprintln!("{}", notice.title);
            }
        }
        None if cli.json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&CaptionResponse::new(captions))?
            );
        }
        None => {
            if captions.is_empty() {
                eprintln!("The model returned no captions.");
            }
            for (i, caption) in captions.iter().enumerate() {
                println!("{}. {}", i + 1, caption);
            }
        }
    }

    Ok(())
}
