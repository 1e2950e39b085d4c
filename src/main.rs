use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use http::{Method, StatusCode};
use regex::bytes::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use httpcap::capture::{self, CaptureOptions};
use httpcap::filter::{FilterConfig, MessageFilter, NetworkFilter};
use httpcap::reassembly::FlowTable;

#[derive(Parser, Debug)]
#[command(name = "httpcap", version, about = "Dump HTTP request/response exchanges from captured TCP traffic")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print all capture devices (requires the `live` feature)
    Devices {
        /// Full information
        #[arg(short, long)]
        full: bool,
    },
    /// Capture traffic and print matching HTTP messages
    Capture(CaptureArgs),
}

#[derive(Args, Debug)]
struct CaptureArgs {
    /// Read packets from a legacy pcap file instead of a live interface
    #[arg(short = 'I', long)]
    input: Option<PathBuf>,

    /// Device name for live capture
    #[arg(short, long, default_value = "eth0")]
    device: String,

    /// BPF capture filter expression
    #[arg(long, default_value = "tcp")]
    bpf: String,

    /// Maximum bytes to read per packet (snaplen)
    #[arg(short = 'l', long, default_value_t = 1 << 11)]
    snaplen: i32,

    /// Capture in promiscuous mode
    #[arg(short = 'P', long)]
    promiscuous: bool,

    /// Keep only flows with this source IP
    #[arg(long = "src.ip")]
    src_ip: Option<IpAddr>,

    /// Keep only flows with this destination IP
    #[arg(long = "dst.ip")]
    dst_ip: Option<IpAddr>,

    /// Keep only flows with this source port
    #[arg(long = "src.port")]
    src_port: Option<u16>,

    /// Keep only flows with this destination port
    #[arg(long = "dst.port")]
    dst_port: Option<u16>,

    /// Keep only requests with this method (implies requests only)
    #[arg(short, long)]
    method: Option<String>,

    /// Keep only responses with this status code (implies responses only)
    #[arg(short, long)]
    status: Option<u16>,

    /// Print requests only
    #[arg(long = "request", visible_alias = "req", conflicts_with = "response_only")]
    request_only: bool,

    /// Print responses only
    #[arg(long = "response", visible_alias = "resp")]
    response_only: bool,

    /// Do not print request/response bodies
    #[arg(short = 'i', long)]
    ignore_body: bool,

    /// Keep only messages whose dump matches this regular expression
    #[arg(short, long)]
    pattern: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Devices { full } => devices(full),
        Command::Capture(args) => run_capture(args).await,
    }
}

#[cfg(feature = "live")]
fn devices(full: bool) -> anyhow::Result<()> {
    capture::list_devices(full)?;
    Ok(())
}

#[cfg(not(feature = "live"))]
fn devices(_full: bool) -> anyhow::Result<()> {
    anyhow::bail!("built without live capture support; rebuild with --features live")
}

async fn run_capture(args: CaptureArgs) -> anyhow::Result<()> {
    let config = Arc::new(filter_config(&args)?);
    let options = CaptureOptions {
        device: args.device,
        bpf: args.bpf,
        promiscuous: args.promiscuous,
        snap_len: args.snaplen,
    };

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                shutdown.cancel();
            }
        });
    }

    let mut table = FlowTable::new(config, shutdown.clone(), tokio::runtime::Handle::current());

    // the packet sources are blocking; keep them off the async workers
    let source = tokio::task::spawn_blocking(move || -> anyhow::Result<FlowTable> {
        match args.input {
            Some(path) => {
                capture::run_file_capture(&path, &mut table)
                    .with_context(|| format!("replaying {}", path.display()))?;
            }
            None => {
                live_capture(&options, &mut table, &shutdown)?;
            }
        }
        Ok(table)
    });

    // closing the table ends every stream; then wait for the handlers to
    // finish framing what they already have
    let handlers = source.await.context("capture source panicked")??.finish();
    futures::future::join_all(handlers).await;
    Ok(())
}

#[cfg(feature = "live")]
fn live_capture(
    options: &CaptureOptions,
    table: &mut FlowTable,
    shutdown: &CancellationToken,
) -> anyhow::Result<()> {
    capture::run_live_capture(options, table, shutdown)?;
    Ok(())
}

#[cfg(not(feature = "live"))]
fn live_capture(
    _options: &CaptureOptions,
    _table: &mut FlowTable,
    _shutdown: &CancellationToken,
) -> anyhow::Result<()> {
    anyhow::bail!("built without live capture support; pass --input <pcap file> or rebuild with --features live")
}

fn filter_config(args: &CaptureArgs) -> anyhow::Result<FilterConfig> {
    let method = args
        .method
        .as_deref()
        .map(|m| Method::from_bytes(m.as_bytes()))
        .transpose()
        .context("invalid method filter")?;
    let status = args
        .status
        .map(StatusCode::from_u16)
        .transpose()
        .context("invalid status filter")?;
    let content = args
        .pattern
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("invalid content pattern")?;

    if args.ignore_body && content.is_some() {
        warn!("content pattern is matched against the body-suppressed dump");
    }

    Ok(FilterConfig {
        network: NetworkFilter {
            src_ip: args.src_ip,
            dst_ip: args.dst_ip,
            src_port: args.src_port,
            dst_port: args.dst_port,
        },
        message: MessageFilter::new(
            method,
            status,
            args.request_only,
            args.response_only,
            content,
            args.ignore_body,
        ),
    })
}
