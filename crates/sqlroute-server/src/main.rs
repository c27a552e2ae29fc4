use clap::Parser;
use sqlroute_core::config::{load_config, DEFAULT_CONFIG_FILE};
use sqlroute_core::Router;
use sqlroute_server::config::ServerConfig;
use sqlroute_server::server::Server;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, env = "SQLROUTE_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Reject unknown config keys
    #[arg(long)]
    strict: bool,
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let cfg = ServerConfig::from_env();
    init_logging(&cfg.log_level);

    tracing::info!(event = "server_start", config_path = ?args.config, server = ?cfg);

    let code = match start(&args, cfg).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(event = "server_fatal", error = %format!("{:#}", e));
            eprintln!("fatal: {e:?}");
            2
        }
    };
    std::process::exit(code);
}

async fn start(args: &Args, cfg: ServerConfig) -> anyhow::Result<()> {
    let router_cfg = load_config(&args.config, args.strict)?;
    let router = Router::from_config(&router_cfg)?;
    Server::new(router, cfg).run().await
}
