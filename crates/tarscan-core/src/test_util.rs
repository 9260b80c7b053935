//! Shared test helpers for `tarscan-core` unit tests.
//!
//! Builders for records and node JSON bodies so that matcher, cache, and
//! accessor tests share one source of dummy data.

use serde_json::{json, Value};

use crate::types::{Bytes, ExcessSignature, KernelRecord, OutputRecord};

// ==============================================================================
// Record Builders
// ==============================================================================

pub fn kernel(nonce: &[u8], signature: &[u8]) -> KernelRecord {
    KernelRecord {
        excess_signature: ExcessSignature {
            public_nonce: Bytes::from(nonce),
            signature: Bytes::from(signature),
        },
        ..KernelRecord::default()
    }
}

pub fn output(payment_reference: &[u8]) -> OutputRecord {
    OutputRecord {
        payment_reference: Bytes::from(payment_reference),
        ..OutputRecord::default()
    }
}

// ==============================================================================
// Node JSON Bodies
// ==============================================================================

/// A header as the node serializes it, with `Buffer`-shaped hash bytes.
pub fn header_json(height: u64) -> Value {
    json!({
        "height": height,
        "hash": {"type": "Buffer", "data": [height as u8, 0xab]},
        "timestamp": 1_700_000_000u64 + height * 120,
        "pow": {"pow_algo": height % 3},
        "kernel_mmr_size": height * 2,
        "output_mmr_size": height * 3
    })
}

pub fn summary_json(tip: u64) -> Value {
    json!({
        "tipInfo": {"metadata": {"best_block_height": tip}},
        "headers": [header_json(tip), header_json(tip.saturating_sub(1))],
        "mempool": []
    })
}

pub fn block_json(height: u64) -> Value {
    json!({
        "header": header_json(height),
        "body": {
            "inputs": [],
            "outputs": [{"payment_reference": {"data": [1, 2, 3, 4]}, "commitment": {"data": [9]}}],
            "kernels": [{"excess_sig": {"public_nonce": {"data": [255, 0]}, "signature": {"data": [170]}}}]
        }
    })
}

pub fn kernels_page_json(count: usize) -> Value {
    let kernels: Vec<Value> = (0..count)
        .map(|i| {
            json!({"excess_sig": {
                "public_nonce": {"data": [i as u8, 0x11]},
                "signature": {"data": [0x22, i as u8]}
            }})
        })
        .collect();
    json!({ "kernels": kernels })
}
