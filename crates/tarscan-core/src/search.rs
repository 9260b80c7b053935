//! Client-side matchers over already-fetched block records.
//!
//! These never perform I/O and never fail: absence of a match is `None`.
//! Kernels match on hex *substrings*, payment references on *exact*
//! (case-insensitive) hex. The asymmetry is intentional and relied upon by
//! in-page highlighting.

use crate::types::{BlockData, KernelRecord, OutputRecord};

/// Index of the first kernel whose nonce hex contains `nonce_query` and/or
/// whose signature hex contains `signature_query`.
///
/// Both queries non-empty means both must match. A single non-empty query
/// matches on its field alone. Both empty never matches.
pub fn kernel_search(
    nonce_query: &str,
    signature_query: &str,
    kernels: Option<&[KernelRecord]>,
) -> Option<usize> {
    let kernels = kernels.filter(|k| !k.is_empty())?;
    if nonce_query.is_empty() && signature_query.is_empty() {
        return None;
    }

    kernels.iter().position(|kernel| {
        let sig = &kernel.excess_signature;
        let nonce_ok =
            nonce_query.is_empty() || sig.public_nonce.to_hex().contains(nonce_query);
        let signature_ok =
            signature_query.is_empty() || sig.signature.to_hex().contains(signature_query);
        nonce_ok && signature_ok
    })
}

/// Index of the first output whose payment reference hex equals
/// `payref_query`, ignoring case.
pub fn payref_search(payref_query: &str, outputs: Option<&[OutputRecord]>) -> Option<usize> {
    if payref_query.is_empty() {
        return None;
    }
    let outputs = outputs.filter(|o| !o.is_empty())?;
    let needle = payref_query.to_lowercase();

    outputs
        .iter()
        .position(|output| output.payment_reference.to_hex() == needle)
}

/// A search key for one page of block records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordQuery {
    Kernel { nonce: String, signature: String },
    PaymentReference(String),
}

impl BlockData {
    /// Run the matcher that belongs to this page's record kind.
    ///
    /// Inputs carry no search key, and a query aimed at a different kind
    /// than the page holds finds nothing.
    pub fn search(&self, query: &RecordQuery) -> Option<usize> {
        match (self, query) {
            (Self::Kernels(kernels), RecordQuery::Kernel { nonce, signature }) => {
                kernel_search(nonce, signature, Some(kernels))
            }
            (Self::Outputs(outputs), RecordQuery::PaymentReference(payref)) => {
                payref_search(payref, Some(outputs))
            }
            _ => None,
        }
    }
}
