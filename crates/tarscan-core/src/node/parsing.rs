//! Decoding of node JSON bodies into typed records.
//!
//! Any shape mismatch becomes `TransportError::InvalidBody`: a body the
//! client cannot decode is as broken as one that is not JSON at all.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{CoreError, TransportError};
use crate::types::{Block, BlockData, BlockHeader, ChainSummary, RecordKind};

fn decode<T: DeserializeOwned>(raw: Value, what: &str) -> Result<T, CoreError> {
    serde_json::from_value(raw)
        .map_err(|e| TransportError::InvalidBody(format!("invalid {what}: {e}")).into())
}

pub(crate) fn decode_summary(raw: Value) -> Result<ChainSummary, CoreError> {
    decode(raw, "chain summary")
}

/// Headers page: either a bare array or an object carrying `headers`.
pub(crate) fn decode_headers(raw: Value) -> Result<Vec<BlockHeader>, CoreError> {
    match raw {
        Value::Array(_) => decode(raw, "header list"),
        Value::Object(mut map) => {
            let headers = map.remove("headers").ok_or_else(|| {
                TransportError::InvalidBody("header list response has no `headers`".to_owned())
            })?;
            decode(headers, "header list")
        }
        other => Err(TransportError::InvalidBody(format!(
            "header list response must be an array or object, got {other}"
        ))
        .into()),
    }
}

/// Single block: either the block itself or wrapped under `block`.
pub(crate) fn decode_block(raw: Value) -> Result<Block, CoreError> {
    match raw {
        Value::Object(mut map) if !map.contains_key("header") && map.contains_key("block") => {
            decode(map.remove("block").unwrap_or(Value::Null), "block")
        }
        raw => decode(raw, "block"),
    }
}

/// Server-side kernel search: a bare array of blocks or `{ "items": [...] }`.
pub(crate) fn decode_search_results(raw: Value) -> Result<Vec<Block>, CoreError> {
    match raw {
        Value::Object(mut map) => {
            let items = map.remove("items").ok_or_else(|| {
                TransportError::InvalidBody("kernel search response has no `items`".to_owned())
            })?;
            decode(items, "kernel search results")
        }
        raw => decode(raw, "kernel search results"),
    }
}

impl RecordKind {
    /// Decode one `block_data` page for this kind.
    ///
    /// The records are located as a bare array, under the kind's name,
    /// under `body.<kind>`, or under `data`, in that order.
    pub(crate) fn decode_page(self, raw: Value) -> Result<BlockData, CoreError> {
        let records = self.locate_records(raw)?;
        let what = format!("{self} page");
        Ok(match self {
            Self::Inputs => BlockData::Inputs(decode(records, &what)?),
            Self::Outputs => BlockData::Outputs(decode(records, &what)?),
            Self::Kernels => BlockData::Kernels(decode(records, &what)?),
        })
    }

    fn locate_records(self, raw: Value) -> Result<Value, CoreError> {
        let mut map = match raw {
            Value::Array(_) => return Ok(raw),
            Value::Object(map) => map,
            other => {
                return Err(TransportError::InvalidBody(format!(
                    "{self} page must be an array or object, got {other}"
                ))
                .into())
            }
        };

        if let Some(records) = map.remove(self.as_str()) {
            return Ok(records);
        }
        if let Some(Value::Object(mut body)) = map.remove("body") {
            if let Some(records) = body.remove(self.as_str()) {
                return Ok(records);
            }
        }
        map.remove("data").ok_or_else(|| {
            TransportError::InvalidBody(format!("block_data response has no `{self}` records"))
                .into()
        })
    }
}
