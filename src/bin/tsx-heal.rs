//! Read a compile request as JSON, write the response as JSON.
//!
//! ```text
//! echo '{"source":"export default () => <p>hi</p>"}' | tsx-heal --offline --pretty
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use tsx_heal::{CompileRequest, Compiler, CompilerConfig};

#[derive(Debug, Parser)]
#[command(name = "tsx-heal", version, about = "Repair, resolve and bundle a TSX component")]
struct Args {
    /// Request JSON file. Reads stdin when omitted.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Link CDN URLs without fetching them.
    #[arg(long, env = "TSX_HEAL_OFFLINE")]
    offline: bool,

    /// Pretty-print the response.
    #[arg(long)]
    pretty: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .ok();
}

fn read_request(input: Option<&PathBuf>) -> Result<CompileRequest> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("parsing compile request")
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = CompilerConfig::from_env();
    if args.offline {
        config = config.offline();
    }

    let request = read_request(args.input.as_ref())?;
    let compiler = Compiler::new(config).context("building HTTP client")?;
    let response = compiler.compile(request).await;

    let out = if args.pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{}", out);

    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}
