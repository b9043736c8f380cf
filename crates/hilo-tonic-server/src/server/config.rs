use anyhow::{Context, bail};
use clap::Parser;
use core::time::Duration;
use hilo_tonic_core::{
    hilo::chunk::MAX_COUNTER,
    types::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_BATCH},
};

/// Runtime configuration for the `hilo-tonic-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file in the working directory is loaded first). The store connection is the
/// exception: `--connection` overrides it, otherwise it is resolved from
/// `HILO_CONNECTION` in the process, user and machine environments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "hilo-tonic-server",
    version,
    about = "A gRPC service handing out unique, increasing ids per key"
)]
pub struct CliArgs {
    /// Store connection descriptor: `memory:` or `file:<path>`.
    ///
    /// When absent (or `STUB`), `HILO_CONNECTION` is looked up in the process
    /// environment, then `~/.config/hilo/hilo.env`, then
    /// `/etc/hilo/hilo.env`.
    #[arg(long)]
    pub connection: Option<String>,

    /// Ids reserved per store round-trip for keys without an override.
    ///
    /// Larger chunks mean fewer writes against each counter record and less
    /// contention between servers, at the cost of larger gaps when a server
    /// restarts.
    ///
    /// Environment variable: `CHUNK_SIZE`
    #[arg(long, env = "CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,

    /// Per-key chunk sizes as `key=size`, comma separated.
    ///
    /// Example: "orders=5000,users=100"
    ///
    /// Environment variable: `KEY_CHUNK_SIZES`
    #[arg(long, env = "KEY_CHUNK_SIZES", value_delimiter = ',')]
    pub key_chunk_sizes: Vec<String>,

    /// Maximum `count` accepted by a `NextIds` request.
    ///
    /// Environment variable: `MAX_BATCH`
    #[arg(long, env = "MAX_BATCH", default_value_t = DEFAULT_MAX_BATCH)]
    pub max_batch: u32,

    /// Deadline in milliseconds for each store call.
    ///
    /// Environment variable: `STORE_TIMEOUT_MS`
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value_t = 5_000)]
    pub store_timeout_ms: u64,

    /// Seconds to wait for in-flight requests to finish on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 5)]
    pub shutdown_timeout: u64,

    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/hilo.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub connection: Option<String>,
    pub chunk_size: u64,
    pub key_chunk_sizes: Vec<(String, u64)>,
    pub max_batch: u32,
    pub store_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub server_addr: String,
    pub uds: bool,
}

fn parse_key_chunk_size(raw: &str) -> anyhow::Result<(String, u64)> {
    let Some((key, size)) = raw.split_once('=') else {
        bail!("KEY_CHUNK_SIZES entry '{raw}' is not of the form key=size");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("KEY_CHUNK_SIZES entry '{raw}' has an empty key");
    }
    let size: u64 = size
        .trim()
        .parse()
        .with_context(|| format!("KEY_CHUNK_SIZES entry '{raw}' has an invalid size"))?;
    if size == 0 {
        bail!("KEY_CHUNK_SIZES entry '{raw}' must have a size greater than 0");
    }
    if size > MAX_COUNTER {
        bail!("KEY_CHUNK_SIZES entry '{raw}' must have a size of at most {MAX_COUNTER}");
    }
    Ok((key.to_owned(), size))
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.chunk_size == 0 {
            bail!("CHUNK_SIZE must be greater than 0");
        }

        if args.chunk_size > MAX_COUNTER {
            bail!("CHUNK_SIZE must be at most {MAX_COUNTER}");
        }

        if args.max_batch == 0 {
            bail!("MAX_BATCH must be greater than 0");
        }

        if args.store_timeout_ms == 0 {
            bail!("STORE_TIMEOUT_MS must be greater than 0");
        }

        let key_chunk_sizes = args
            .key_chunk_sizes
            .iter()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| parse_key_chunk_size(raw))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            connection: args.connection,
            chunk_size: args.chunk_size,
            key_chunk_sizes,
            max_batch: args.max_batch,
            store_timeout: Duration::from_millis(args.store_timeout_ms),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            server_addr: args.server_addr,
            uds: args.uds,
        })
    }
}
