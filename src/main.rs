use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use overlay_translator_rust::ocr::ExtractionGranularity;
use overlay_translator_rust::{Config, logging, run};

#[derive(Parser, Debug)]
#[command(
    name = "overlay-translator-rust",
    version,
    about = "Translate the text in a photo and draw it back over the original"
)]
struct Cli {
    /// Image to translate
    image: PathBuf,

    /// Target language code (e.g. ko, ja, en)
    #[arg(short = 'l', long = "lang")]
    lang: String,

    /// Source language code. Use "auto" to detect.
    #[arg(short = 'L', long = "source-lang", default_value = "auto")]
    source_lang: String,

    /// Output path (default: <stem>_translated.png next to the input)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Region grouping: line or paragraph (overrides [ocr].granularity)
    #[arg(short = 'g', long = "granularity")]
    granularity: Option<ExtractionGranularity>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Write detected region boxes next to the output
    #[arg(long = "debug-ocr")]
    debug_ocr: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let config = Config {
        image: cli.image,
        lang: cli.lang,
        source_lang: cli.source_lang,
        output: cli.output,
        granularity: cli.granularity,
        settings_path: cli.read_settings,
        debug_ocr: cli.debug_ocr,
    };

    match run(config).await? {
        Some(path) => println!("{}", path.display()),
        None => println!("no text found"),
    }
    Ok(())
}
