use anyhow::Context;
use clap::{CommandFactory, Parser};

use fasttalk_tts::config::{render_config, Cli, Mode, Settings};
use fasttalk_tts::logging::init_logging;
use fasttalk_tts::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_args(cli.settings).context("Invalid configuration")?;

    match cli.mode {
        Mode::Config => {
            if cli.show {
                println!("{}", render_config(&settings));
            } else {
                Cli::command().print_help()?;
                println!();
            }
            Ok(())
        }
        Mode::Websocket => {
            let _log_guard = init_logging(
                settings.log_level,
                settings.log_format,
                Some(&settings.log_directory),
            );

            tracing::info!("FastTalk TTS Service v{}", env!("CARGO_PKG_VERSION"));
            settings.ensure_directories();
            settings.log_summary();

            server::run(settings).await
        }
    }
}
