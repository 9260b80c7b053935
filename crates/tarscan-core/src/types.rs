//! Domain types decoded from the explorer node's JSON endpoint.
//!
//! The node emits loosely shaped JSON (byte strings as Node `Buffer`
//! objects, numbers sometimes as strings, nested proof-of-work metadata).
//! Everything here is decoded into explicit types at the transport
//! boundary so callers and matchers never walk raw `serde_json::Value`s.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

type JsonMap = serde_json::Map<String, serde_json::Value>;

// ==============================================================================
// Byte Strings
// ==============================================================================

/// A byte string as emitted by the node.
///
/// Accepts `{"type": "Buffer", "data": [..]}`, a bare array of bytes, or a
/// hex string (optionally `0x`-prefixed). `null` and a missing `data` field
/// decode to empty bytes. Serializes as lowercase hex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercase hex encoding, the form matchers compare against.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Bytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Array(Vec<u8>),
            Hex(String),
            Buffer {
                #[serde(default)]
                data: Option<Vec<u8>>,
            },
        }

        match Option::<Repr>::deserialize(deserializer)? {
            None => Ok(Self::default()),
            Some(Repr::Array(bytes)) => Ok(Self(bytes)),
            Some(Repr::Buffer { data }) => Ok(Self(data.unwrap_or_default())),
            Some(Repr::Hex(s)) => {
                let s = s.trim();
                let s = s.strip_prefix("0x").unwrap_or(s);
                hex::decode(s)
                    .map(Self)
                    .map_err(|e| serde::de::Error::custom(format!("invalid hex bytes: {e}")))
            }
        }
    }
}

impl Serialize for Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

// Integer fields arrive as JSON numbers or as decimal strings depending on
// which node version produced the body.
fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(u64),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Number(n) => Ok(n),
        Repr::Text(s) => s
            .trim()
            .parse()
            .map_err(|e| serde::de::Error::custom(format!("invalid integer `{s}`: {e}"))),
    }
}

fn lenient_opt_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "lenient_u64")] u64);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(n)| n))
}

// ==============================================================================
// Proof of Work
// ==============================================================================

/// Mining algorithm recorded in a block header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub enum PowAlgo {
    #[default]
    MoneroRandomX,
    Sha3x,
    TariRandomX,
    Unknown(u64),
}

impl From<u64> for PowAlgo {
    fn from(n: u64) -> Self {
        match n {
            0 => Self::MoneroRandomX,
            1 => Self::Sha3x,
            2 => Self::TariRandomX,
            other => Self::Unknown(other),
        }
    }
}

impl From<PowAlgo> for u64 {
    fn from(algo: PowAlgo) -> Self {
        match algo {
            PowAlgo::MoneroRandomX => 0,
            PowAlgo::Sha3x => 1,
            PowAlgo::TariRandomX => 2,
            PowAlgo::Unknown(n) => n,
        }
    }
}

impl std::fmt::Display for PowAlgo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MoneroRandomX => write!(f, "RandomX (Monero)"),
            Self::Sha3x => write!(f, "Sha3x"),
            Self::TariRandomX => write!(f, "RandomX (Tari)"),
            Self::Unknown(n) => write!(f, "unknown ({n})"),
        }
    }
}

// ==============================================================================
// Block Header
// ==============================================================================

/// One block header. Immutable once decoded; the node is the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawBlockHeader")]
pub struct BlockHeader {
    pub height: u64,
    pub hash: Bytes,
    /// Unix seconds.
    pub timestamp: u64,
    pub pow_algo: PowAlgo,
    pub kernel_mmr_size: u64,
    pub output_mmr_size: u64,
}

#[derive(Deserialize)]
struct RawBlockHeader {
    #[serde(deserialize_with = "lenient_u64")]
    height: u64,
    #[serde(default)]
    hash: Bytes,
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    timestamp: Option<u64>,
    #[serde(default)]
    pow: Option<RawPow>,
    #[serde(default)]
    pow_algo: Option<PowAlgo>,
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    kernel_mmr_size: Option<u64>,
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    output_mmr_size: Option<u64>,
}

#[derive(Deserialize)]
struct RawPow {
    #[serde(default)]
    pow_algo: Option<PowAlgo>,
}

impl From<RawBlockHeader> for BlockHeader {
    fn from(raw: RawBlockHeader) -> Self {
        // The top-level field wins; older nodes only nest it under `pow`.
        let pow_algo = raw
            .pow_algo
            .or_else(|| raw.pow.and_then(|pow| pow.pow_algo))
            .unwrap_or_default();
        Self {
            height: raw.height,
            hash: raw.hash,
            timestamp: raw.timestamp.unwrap_or(0),
            pow_algo,
            kernel_mmr_size: raw.kernel_mmr_size.unwrap_or(0),
            output_mmr_size: raw.output_mmr_size.unwrap_or(0),
        }
    }
}

// ==============================================================================
// Block Body Records
// ==============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcessSignature {
    #[serde(default)]
    pub public_nonce: Bytes,
    #[serde(default)]
    pub signature: Bytes,
}

/// One transaction kernel within a block body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelRecord {
    #[serde(default, alias = "excess_sig")]
    pub excess_signature: ExcessSignature,
    #[serde(default)]
    pub excess: Bytes,
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub fee: Option<u64>,
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub lock_height: Option<u64>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// One output within a block body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    #[serde(default)]
    pub payment_reference: Bytes,
    #[serde(default)]
    pub commitment: Bytes,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// One input within a block body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
    #[serde(default)]
    pub commitment: Bytes,
    #[serde(default)]
    pub output_hash: Bytes,
    #[serde(flatten)]
    pub extra: JsonMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockBody {
    #[serde(default)]
    pub inputs: Vec<InputRecord>,
    #[serde(default)]
    pub outputs: Vec<OutputRecord>,
    #[serde(default)]
    pub kernels: Vec<KernelRecord>,
}

/// A single block as returned by `blocks/{heightOrHash}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    #[serde(default)]
    pub body: BlockBody,
    #[serde(flatten)]
    pub extra: JsonMap,
}

// ==============================================================================
// Chain Summary
// ==============================================================================

/// The node's landing-page summary: recent headers, tip metadata, mempool,
/// and aggregate statistics (kept opaque in `extra`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainSummary {
    #[serde(default)]
    pub headers: Vec<BlockHeader>,
    #[serde(default, rename = "tipInfo")]
    pub tip_info: Option<TipInfo>,
    #[serde(default)]
    pub mempool: Vec<serde_json::Value>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipInfo {
    #[serde(default)]
    pub metadata: Option<ChainMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMetadata {
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub best_block_height: Option<u64>,
}

impl ChainSummary {
    /// Tip height from the node's metadata, falling back to the newest header.
    pub fn tip_height(&self) -> Option<u64> {
        self.tip_info
            .as_ref()
            .and_then(|tip| tip.metadata.as_ref())
            .and_then(|meta| meta.best_block_height)
            .or_else(|| self.headers.iter().map(|h| h.height).max())
    }

    /// Current network hash rate per mining algorithm, in hashes per second.
    ///
    /// Read from the summary's `current*HashRate` aggregates; algorithms the
    /// node does not report are left out.
    pub fn hash_rates(&self) -> Vec<(PowAlgo, f64)> {
        const FIELDS: [(PowAlgo, &str); 3] = [
            (PowAlgo::MoneroRandomX, "currentMoneroRandomxHashRate"),
            (PowAlgo::Sha3x, "currentSha3xHashRate"),
            (PowAlgo::TariRandomX, "currentTariRandomxHashRate"),
        ];

        FIELDS
            .into_iter()
            .filter_map(|(algo, field)| {
                let rate = match self.extra.get(field)? {
                    serde_json::Value::Number(n) => n.as_f64(),
                    serde_json::Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                }?;
                Some((algo, rate))
            })
            .collect()
    }
}

// ==============================================================================
// Block Identifier
// ==============================================================================

/// Identifies a block by height or by hex hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockId {
    Height(u64),
    /// Lowercase hex, without `0x`.
    Hash(String),
}

impl FromStr for BlockId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CoreError::Validation(
                "block height or hash must not be empty".to_owned(),
            ));
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(height) = s.parse::<u64>() {
                return Ok(Self::Height(height));
            }
        }

        let hash = s.strip_prefix("0x").unwrap_or(s).to_ascii_lowercase();
        hex::decode(&hash)
            .map_err(|e| CoreError::Validation(format!("invalid block hash `{s}`: {e}")))?;
        Ok(Self::Hash(hash))
    }
}

impl From<u64> for BlockId {
    fn from(height: u64) -> Self {
        Self::Height(height)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Height(height) => height.fmt(f),
            Self::Hash(hash) => f.write_str(hash),
        }
    }
}

// ==============================================================================
// Paginated Sub-Records
// ==============================================================================

/// The three kinds of block sub-record that can be paged through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Inputs,
    Outputs,
    Kernels,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [Self::Inputs, Self::Outputs, Self::Kernels];

    /// Value of the `what=` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inputs => "inputs",
            Self::Outputs => "outputs",
            Self::Kernels => "kernels",
        }
    }
}

impl FromStr for RecordKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "unknown record kind `{s}`; expected inputs, outputs, or kernels"
                ))
            })
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One page of a block's sub-records, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "records", rename_all = "snake_case")]
pub enum BlockData {
    Inputs(Vec<InputRecord>),
    Outputs(Vec<OutputRecord>),
    Kernels(Vec<KernelRecord>),
}

impl BlockData {
    pub fn empty(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Inputs => Self::Inputs(Vec::new()),
            RecordKind::Outputs => Self::Outputs(Vec::new()),
            RecordKind::Kernels => Self::Kernels(Vec::new()),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Inputs(_) => RecordKind::Inputs,
            Self::Outputs(_) => RecordKind::Outputs,
            Self::Kernels(_) => RecordKind::Kernels,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Inputs(records) => records.len(),
            Self::Outputs(records) => records.len(),
            Self::Kernels(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
