use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use log::info;
use markout::{RenderConfig, RenderRequest, Renderer, DEFAULT_SIZE, DEFAULT_THEME};

/// Render a Markdown file into a themed poster image
#[derive(Parser, Debug)]
#[command(name = "markout", version, about)]
struct Cli {
    /// Markdown file to render
    input: PathBuf,

    /// Image path; relative names go to ~/Downloads/markout
    output: Option<String>,

    /// Theme passed to the front-end
    #[arg(default_value = DEFAULT_THEME)]
    theme: String,

    /// Viewport size token (`pc` or `mobile`)
    #[arg(default_value = DEFAULT_SIZE)]
    size: String,

    /// Template passed to the front-end
    template: Option<String>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("markout: failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(path) => {
            println!("{}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            // Printed directly so RUST_LOG cannot hide it
            eprintln!("markout: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<PathBuf> {
    let config = RenderConfig::from_env()?;
    info!("Rendering {} (theme {}, size {})", cli.input.display(), cli.theme, cli.size);

    let renderer = Renderer::from_config(config)?;
    let output = renderer
        .render(RenderRequest {
            input: cli.input,
            output: cli.output,
            theme: cli.theme,
            size: cli.size,
            template: cli.template,
        })
        .await?;

    Ok(output.path)
}
