mod cli;
mod output;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{eyre, WrapErr};

use tarscan_core::explorer::FromQueryData;
use tarscan_core::{
    CacheConfig, Explorer, ExplorerConfig, HttpNodeClient, QueryResult, RecordKind, RecordQuery,
};

use cli::{Command, OutputFormat};
use output::{emit, PageView};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    if args.poll_interval_ms == 0 {
        return Err(eyre!("--poll-interval-ms must be greater than zero"));
    }
    let poll_interval = Duration::from_millis(args.poll_interval_ms);

    let client = HttpNodeClient::new(&args.node_url, args.requests_per_second)
        .wrap_err("while configuring the explorer node client")?;
    tracing::info!(node = %client.base_url(), "using explorer node");

    let config = ExplorerConfig {
        summary_poll_interval: poll_interval,
        cache: CacheConfig {
            default_poll_interval: poll_interval,
            stale_after: poll_interval,
            max_idle_entries: args.max_idle_entries,
            ..CacheConfig::default()
        },
    };
    let explorer = Explorer::new(Arc::new(client), config);

    run(&explorer, args.command, args.output).await
}

async fn run(explorer: &Explorer, command: Command, format: OutputFormat) -> eyre::Result<()> {
    match command {
        Command::Summary { watch: false } => {
            let summary = settled(explorer.all_blocks().await).wrap_err("load chain summary")?;
            emit(format, summary.as_ref())
        }
        Command::Summary { watch: true } => watch_summary(explorer, format).await,
        Command::Headers { from, limit } => {
            let headers = settled(explorer.blocks_by_range(from, limit).await)
                .wrap_err_with(|| format!("load {limit} headers from height {from}"))?;
            emit(format, headers.as_slice())
        }
        Command::Block { id } => {
            let block = settled(explorer.block_by_height_or_hash(&id).await)
                .wrap_err_with(|| format!("load block {id}"))?;
            emit(format, block.as_ref())
        }
        Command::BlockData {
            id,
            what,
            from,
            to,
            nonce,
            signature,
            payref,
        } => {
            let query = record_query(what, nonce, signature, payref)?;
            let page = settled(explorer.paginated_block_data(&id, what, from, to).await)
                .wrap_err_with(|| format!("load {what} {from}..{to} of block {id}"))?;
            let matched = query.as_ref().and_then(|q| page.search(q));
            if query.is_some() && matched.is_none() {
                tracing::info!(block = %id, kind = %what, "no matching record on this page");
            }
            let view = PageView {
                block: id.to_string(),
                from,
                to,
                page: page.as_ref(),
                matched,
            };
            emit(format, &view)
        }
        Command::SearchKernels { nonces, signatures } => {
            let blocks = settled(explorer.search_by_kernel(&nonces, &signatures).await)
                .wrap_err("search kernels")?;
            emit(format, blocks.as_slice())
        }
    }
}

/// Print the chain summary after every refresh until interrupted.
async fn watch_summary(explorer: &Explorer, format: OutputFormat) -> eyre::Result<()> {
    let mut live = explorer.watch_all_blocks();
    loop {
        tokio::select! {
            changed = live.changed() => {
                let Some(result) = changed else {
                    return Ok(());
                };
                match (&result.data, &result.error) {
                    // A failed refresh keeps the previous summary; report and keep polling.
                    (_, Some(err)) => tracing::warn!(error = %err, "summary refresh failed"),
                    (Some(summary), None) => emit(format, summary.as_ref())?,
                    (None, None) => {}
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("listen for ctrl-c")?;
                tracing::info!("interrupted; stopping summary watch");
                return Ok(());
            }
        }
    }
}

/// Kernel queries are matched against lowercase hex.
fn record_query(
    kind: RecordKind,
    nonce: Option<String>,
    signature: Option<String>,
    payref: Option<String>,
) -> eyre::Result<Option<RecordQuery>> {
    if let Some(payref) = payref {
        if kind != RecordKind::Outputs {
            return Err(eyre!("--payref only applies to --what outputs"));
        }
        return Ok(Some(RecordQuery::PaymentReference(payref)));
    }
    if nonce.is_none() && signature.is_none() {
        return Ok(None);
    }
    if kind != RecordKind::Kernels {
        return Err(eyre!("--nonce and --signature only apply to --what kernels"));
    }
    Ok(Some(RecordQuery::Kernel {
        nonce: nonce.unwrap_or_default().to_ascii_lowercase(),
        signature: signature.unwrap_or_default().to_ascii_lowercase(),
    }))
}

fn settled<T: FromQueryData>(result: QueryResult<T>) -> eyre::Result<Arc<T>> {
    if let Some(err) = result.error {
        return Err(eyre!(err));
    }
    result
        .data
        .ok_or_else(|| eyre!("query finished without data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_query_is_lowercased() {
        let query = record_query(
            RecordKind::Kernels,
            Some("ABcd".to_owned()),
            None,
            None,
        )
        .expect("kernel query must build");
        assert_eq!(
            query,
            Some(RecordQuery::Kernel {
                nonce: "abcd".to_owned(),
                signature: String::new(),
            })
        );
    }

    #[test]
    fn query_must_fit_record_kind() {
        assert!(record_query(RecordKind::Inputs, None, None, Some("aa".to_owned())).is_err());
        assert!(record_query(RecordKind::Outputs, Some("aa".to_owned()), None, None).is_err());
        assert_eq!(
            record_query(RecordKind::Inputs, None, None, None).expect("no query is fine"),
            None
        );
    }
}
