use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use dotenvy::dotenv;
use reqwest::Url;
use server::store::RouteStore;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

mod client;
mod config;
mod editor;
mod model;
mod render;
mod server;
mod terminal;
mod utils;

#[derive(Parser, Debug)]
#[command(version, about = "Edit stop delays of a route with autosave")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the route pages and the save API
    Serve {
        #[arg(long)]
        bind: Option<SocketAddr>,

        #[arg(long)]
        routes_file: Option<PathBuf>,
    },
    /// Open a served route page and edit its stops from the terminal
    Edit {
        page_url: Url,

        /// Used instead of the identifier the page carries
        #[arg(long)]
        route_id: Option<String>,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    _ = dotenv();
    let cli = Cli::parse();
    let config = Config::from_env().context("bad configuration")?;

    match cli.command {
        Command::Serve { bind, routes_file } => {
            let _guard = init_tracing(&config, true);

            let routes_file = routes_file.unwrap_or(config.routes_file);
            let store = Arc::new(RouteStore::load(&routes_file).await?);
            info!("routes file: {}", routes_file.display());

            server::serve(bind.unwrap_or(config.bind_addr), store).await
        }
        Command::Edit { page_url, route_id } => {
            // stdout belongs to the prompt, so only the file gets logs
            let _guard = init_tracing(&config, false);

            terminal::edit(&config, page_url, route_id).await
        }
    }
}

fn init_tracing(config: &Config, to_stdout: bool) -> WorkerGuard {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let appender = tracing_appender::rolling::daily(&config.log_dir, "route_delay_editor.log");
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(appender);

    // A layer that logs events to rolling files.
    let file_log = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_appender)
        .with_ansi(false)
        .pretty();

    let stdout_log = to_stdout.then(|| tracing_subscriber::fmt::layer().compact().boxed());

    Registry::default()
        .with(file_log)
        .with(stdout_log)
        .with(env_filter)
        .init();

    guard
}
