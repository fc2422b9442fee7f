use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use wx_preview_native::config::{SyncConfig, CONFIG_FILE};
use wx_preview_native::sync::{self, SyncTool};
use wx_preview_native::{wxml, wxss};

#[derive(Parser)]
#[command(name = "wx-preview")]
#[command(about = "Sync Mini Program pages to browser previews")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Config file (defaults apply when it does not exist)
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,

    /// Page to sync, shorthand for `sync <page>`
    page: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync one page, or every configured page, component and app.wxss
    Sync {
        page: Option<String>,
    },
    /// Re-sync whenever sources change
    Watch,
    /// Print a WXML file converted to HTML
    Wxml {
        file: PathBuf,
    },
    /// Print a WXSS file converted to CSS
    Wxss {
        file: PathBuf,
    },
    /// Drop cached conversions
    Clean,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .init();

    let cli = Cli::parse();
    let command = match (cli.command, cli.page) {
        (Some(command), _) => command,
        (None, page) => Commands::Sync { page },
    };

    match run(command, &cli.config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            log::error!("[wx-preview] {}", message);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, config_path: &Path) -> Result<(), String> {
    match command {
        Commands::Wxml { file } => {
            let source = fs::read_to_string(&file).map_err(|e| format!("{}: {}", file.display(), e))?;
            println!("{}", wxml::convert(&source));
        }
        Commands::Wxss { file } => {
            let source = fs::read_to_string(&file).map_err(|e| format!("{}: {}", file.display(), e))?;
            println!("{}", wxss::convert(&source));
        }
        Commands::Sync { page } => {
            let tool = SyncTool::new(SyncConfig::load(config_path).map_err(|e| e.to_string())?);
            let report = match page {
                Some(page) => tool.sync_page(&page),
                None => tool.sync_all(),
            }
            .map_err(|e| e.to_string())?;
            log::info!(
                "[wx-preview] {} files written ({} cached)",
                report.written.len(),
                report.cached
            );
        }
        Commands::Clean => {
            let tool = SyncTool::new(SyncConfig::load(config_path).map_err(|e| e.to_string())?);
            let removed = tool.clear_cache();
            log::info!("[wx-preview] removed {} cache entries", removed);
        }
        Commands::Watch => {
            let tool = SyncTool::new(SyncConfig::load(config_path).map_err(|e| e.to_string())?);
            sync::watch(&tool).map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}
