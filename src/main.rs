use std::net::SocketAddr;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use signpost::config::Config;
use signpost::resolver::Resolver;
use signpost::server::Server;
use signpost::table::MatchTable;

#[derive(Parser)]
#[command(name = "signpost")]
#[command(about = "Static-table DNS responder with upstream forwarding", long_about = None)]
struct Args {
    /// Configuration file with the record table
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (overrides the config file)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Upstream resolver (overrides the config file)
    #[arg(short, long)]
    upstream: Option<SocketAddr>,

    /// Answer TTL in seconds (overrides the config file)
    #[arg(long)]
    ttl: Option<u32>,

    /// Give up on a forwarded query after this many milliseconds
    #[arg(long)]
    upstream_timeout_ms: Option<u64>,

    /// Log filter when RUST_LOG is unset (e.g. "info", "signpost=debug")
    #[arg(long, default_value = "signpost=info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &args.config {
        Some(path) => {
            Config::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => Config::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(upstream) = args.upstream {
        config.upstream = upstream;
    }
    if let Some(ttl) = args.ttl {
        config.ttl = ttl;
    }
    let recv_timeout = args.upstream_timeout_ms.map(Duration::from_millis);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let local = tokio::task::LocalSet::new();
    local.block_on(&rt, run(config, recv_timeout))
}

async fn run(config: Config, recv_timeout: Option<Duration>) -> anyhow::Result<()> {
    let table = MatchTable::new(
        config
            .records
            .into_iter()
            .map(|(name, value)| (name, value.into_addrs())),
    );
    let resolver = Rc::new(Resolver::new(table, config.ttl));

    let server = Server::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;

    info!(
        listen = %config.listen,
        upstream = %config.upstream,
        names = resolver.table_len(),
        "listening"
    );

    server.start(config.upstream, resolver, recv_timeout);

    // The listener runs on the LocalSet until the process is killed.
    std::future::pending::<()>().await;
    Ok(())
}
