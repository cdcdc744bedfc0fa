use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::types::TransferEvent;

/// Why a raw input line could not be turned into a [`TransferEvent`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("line is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("invalid JSON record: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("empty address in field '{0}'")]
    EmptyAddress(&'static str),

    #[error("value {0} is not a non-negative integer")]
    InvalidValue(String),
}

/// Wire shape of a transfer record. Extra fields are ignored.
#[derive(Debug, Deserialize)]
struct RawTransferRecord {
    src: String,
    dst: String,
    value: JsonValue,
}

/// Decode one line of the input stream.
///
/// Returns `Ok(None)` for blank lines. `value` may be a JSON integer or a decimal
/// string, since web3 emitters produce both for amounts above 2^53.
pub fn decode_transfer_line(line: &[u8]) -> Result<Option<TransferEvent>, DecodeError> {
    let text = std::str::from_utf8(line)?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let raw: RawTransferRecord = serde_json::from_str(text)?;

    let src = raw.src.trim();
    let dst = raw.dst.trim();
    if src.is_empty() {
        return Err(DecodeError::EmptyAddress("src"));
    }
    if dst.is_empty() {
        return Err(DecodeError::EmptyAddress("dst"));
    }

    let value = parse_value(&raw.value)?;

    Ok(Some(TransferEvent::new(src, dst, value)))
}

fn parse_value(value: &JsonValue) -> Result<u128, DecodeError> {
    match value {
        JsonValue::Number(n) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| DecodeError::InvalidValue(n.to_string())),
        JsonValue::String(s) => s
            .trim()
            .parse::<u128>()
            .map_err(|_| DecodeError::InvalidValue(format!("\"{}\"", s))),
        other => Err(DecodeError::InvalidValue(other.to_string())),
    }
}
