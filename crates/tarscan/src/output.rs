//! Printing of query results as JSON or plain text lines.

use eyre::WrapErr;
use serde::Serialize;
use tarscan_core::format::{format_hash_rate, format_thousands, format_timestamp, shorten_hex};
use tarscan_core::types::{Block, BlockHeader, ChainSummary};
use tarscan_core::BlockData;

use crate::cli::OutputFormat;

/// Hex characters kept on each side of a shortened hash.
const HEX_KEEP: usize = 8;

/// Text rendering for `--output text`.
pub trait Render {
    fn lines(&self) -> Vec<String>;
}

pub fn emit<T: Render + Serialize + ?Sized>(format: OutputFormat, value: &T) -> eyre::Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value).context("serialize output")?;
            println!("{json}");
        }
        OutputFormat::Text => {
            for line in value.lines() {
                println!("{line}");
            }
        }
    }
    Ok(())
}

// ==============================================================================
// Chain Data
// ==============================================================================

fn header_line(header: &BlockHeader) -> String {
    format!(
        "{:>12}  {}  {}  {:<14}  kernels {:>12}  outputs {:>12}",
        format_thousands(header.height),
        shorten_hex(&header.hash.to_hex(), HEX_KEEP),
        format_timestamp(header.timestamp),
        header.pow_algo.to_string(),
        format_thousands(header.kernel_mmr_size),
        format_thousands(header.output_mmr_size),
    )
}

impl Render for ChainSummary {
    fn lines(&self) -> Vec<String> {
        let tip = self
            .tip_height()
            .map_or_else(|| "unknown".to_owned(), format_thousands);
        let mut lines = vec![format!(
            "tip {tip}  mempool {}",
            format_thousands(self.mempool.len() as u64)
        )];
        let rates = self.hash_rates();
        if !rates.is_empty() {
            let rates: Vec<String> = rates
                .into_iter()
                .map(|(algo, rate)| format!("{algo} {}", format_hash_rate(rate)))
                .collect();
            lines.push(format!("hash rate  {}", rates.join("  ")));
        }
        lines.extend(self.headers.iter().map(header_line));
        lines
    }
}

impl Render for [BlockHeader] {
    fn lines(&self) -> Vec<String> {
        self.iter().map(header_line).collect()
    }
}

impl Render for Block {
    fn lines(&self) -> Vec<String> {
        vec![
            header_line(&self.header),
            format!(
                "inputs {}  outputs {}  kernels {}",
                format_thousands(self.body.inputs.len() as u64),
                format_thousands(self.body.outputs.len() as u64),
                format_thousands(self.body.kernels.len() as u64),
            ),
        ]
    }
}

impl Render for [Block] {
    fn lines(&self) -> Vec<String> {
        self.iter().map(|block| header_line(&block.header)).collect()
    }
}

// ==============================================================================
// Block Data Pages
// ==============================================================================

/// A fetched page plus the position of a located record, if any.
#[derive(Serialize)]
pub struct PageView<'a> {
    pub block: String,
    pub from: u64,
    pub to: u64,
    pub page: &'a BlockData,
    /// Index within the page of the first matching record.
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub matched: Option<usize>,
}

impl Render for PageView<'_> {
    fn lines(&self) -> Vec<String> {
        let records: Vec<String> = match self.page {
            BlockData::Inputs(inputs) => inputs
                .iter()
                .map(|input| format!("commitment {}", input.commitment.to_hex()))
                .collect(),
            BlockData::Outputs(outputs) => outputs
                .iter()
                .map(|output| {
                    format!(
                        "payref {}  commitment {}",
                        output.payment_reference.to_hex(),
                        shorten_hex(&output.commitment.to_hex(), HEX_KEEP)
                    )
                })
                .collect(),
            BlockData::Kernels(kernels) => kernels
                .iter()
                .map(|kernel| {
                    let sig = &kernel.excess_signature;
                    format!(
                        "nonce {}  signature {}",
                        sig.public_nonce.to_hex(),
                        sig.signature.to_hex()
                    )
                })
                .collect(),
        };

        let mut lines = vec![format!(
            "block {}  {} {}..{}  ({} returned)",
            self.block,
            self.page.kind(),
            self.from,
            self.to,
            self.page.len()
        )];
        lines.extend(records.into_iter().enumerate().map(|(i, record)| {
            let marker = if self.matched == Some(i) { '*' } else { ' ' };
            format!("{marker} {:>6}  {record}", self.from + i as u64)
        }));
        lines
    }
}

#[cfg(test)]
mod tests {
    use tarscan_core::types::{Bytes, OutputRecord, PowAlgo};

    use super::*;

    fn header() -> BlockHeader {
        BlockHeader {
            height: 1_234_567,
            hash: Bytes(vec![0xab; 32]),
            timestamp: 0,
            pow_algo: PowAlgo::Sha3x,
            kernel_mmr_size: 1000,
            output_mmr_size: 2000,
        }
    }

    #[test]
    fn header_line_is_human_readable() {
        let line = header_line(&header());
        assert!(line.contains("1,234,567"));
        assert!(line.contains("abababab…abababab"));
        assert!(line.contains("1970-01-01 00:00:00 UTC"));
        assert!(line.contains("1,000") && line.contains("2,000"));
    }

    #[test]
    fn summary_lines_include_hash_rates() {
        let summary: ChainSummary = serde_json::from_value(serde_json::json!({
            "tipInfo": {"metadata": {"best_block_height": 12_000}},
            "headers": [],
            "currentSha3xHashRate": 1_500_000
        }))
        .expect("summary must decode");

        let lines = summary.lines();
        assert_eq!(lines[0], "tip 12,000  mempool 0");
        assert_eq!(lines[1], "hash rate  Sha3x 1.50 MH/s");
    }

    #[test]
    fn page_view_marks_the_match() {
        let page = BlockData::Outputs(vec![
            OutputRecord {
                payment_reference: Bytes(vec![0x01]),
                ..OutputRecord::default()
            },
            OutputRecord {
                payment_reference: Bytes(vec![0x02]),
                ..OutputRecord::default()
            },
        ]);
        let view = PageView {
            block: "42".to_owned(),
            from: 10,
            to: 12,
            page: &page,
            matched: Some(1),
        };

        let lines = view.lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("block 42  outputs 10..12"));
        assert!(lines[1].starts_with("      10"));
        assert!(lines[2].starts_with("*     11  payref 02"));

        let json = serde_json::to_value(&view).expect("view must serialize");
        assert_eq!(json["match"], 1);
        assert_eq!(json["page"]["kind"], "outputs");
    }
}
