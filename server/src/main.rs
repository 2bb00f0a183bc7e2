use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use search_core::config;
use server::{build_app, ServerSettings};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Cache directory written by `hybrid-search build`
    #[arg(long, default_value = "cache")]
    cache: PathBuf,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Width of the hashing encoder's vectors; must match the build
    #[arg(long, default_value_t = config::HASHING_DIMENSION)]
    dimension: usize,
    /// Newline-delimited stopword list; must match the build
    #[arg(long)]
    stopwords: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let settings = ServerSettings {
        cache_dir: args.cache.clone(),
        dimension: args.dimension,
        stopwords: args.stopwords,
        admin_token: std::env::var("ADMIN_TOKEN").ok(),
    };
    let app: Router = build_app(settings)
        .with_context(|| format!("loading cache from {}; run `hybrid-search build` first", args.cache.display()))?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
