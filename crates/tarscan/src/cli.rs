use clap::{Parser, Subcommand, ValueEnum};
use tarscan_core::{BlockId, RecordKind};

/// tarscan: read-only client for a Tari block explorer node.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Base URL of the explorer node.
    #[arg(long, default_value = "http://127.0.0.1:4000", env = "TARSCAN_NODE_URL")]
    pub node_url: String,

    /// Maximum outbound requests per second (unlimited if omitted).
    #[arg(long, env = "TARSCAN_REQUESTS_PER_SECOND")]
    pub requests_per_second: Option<u32>,

    /// Refresh interval for watched queries, in milliseconds.
    #[arg(long, default_value = "120000", env = "TARSCAN_POLL_INTERVAL_MS")]
    pub poll_interval_ms: u64,

    /// Maximum number of unobserved cache entries kept around.
    #[arg(long, default_value = "512")]
    pub max_idle_entries: usize,

    /// How results are printed.
    #[arg(long, value_enum, default_value = "json")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON.
    Json,
    /// One human-readable line per record.
    Text,
}

#[derive(Subcommand)]
pub enum Command {
    /// Chain summary: tip, recent headers, mempool.
    Summary {
        /// Keep running and print the summary after every refresh.
        #[arg(long)]
        watch: bool,
    },

    /// Block headers starting at a height.
    Headers {
        #[arg(long)]
        from: u64,
        #[arg(long, default_value = "20")]
        limit: u64,
    },

    /// A single block by height or hex hash.
    Block { id: BlockId },

    /// One page of a block's inputs, outputs, or kernels.
    BlockData {
        id: BlockId,

        #[arg(long)]
        what: RecordKind,

        /// First record index (inclusive).
        #[arg(long, default_value = "0")]
        from: u64,

        /// Last record index (exclusive).
        #[arg(long, default_value = "10")]
        to: u64,

        /// Locate the first kernel whose nonce hex contains this value.
        #[arg(long)]
        nonce: Option<String>,

        /// Locate the first kernel whose signature hex contains this value.
        #[arg(long)]
        signature: Option<String>,

        /// Locate the output with exactly this payment reference.
        #[arg(long, conflicts_with_all = ["nonce", "signature"])]
        payref: Option<String>,
    },

    /// Ask the node for blocks containing matching kernels.
    SearchKernels {
        /// Kernel public nonce (repeatable).
        #[arg(long = "nonce")]
        nonces: Vec<String>,

        /// Kernel signature (repeatable).
        #[arg(long = "signature")]
        signatures: Vec<String>,
    },
}
