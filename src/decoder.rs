//! Decoding of raw feed frames into [`DepthUpdate`]s.
//!
//! Decoding is a pure function of the frame bytes. Frames that are not JSON
//! fail with [`DecodeError::Malformed`]; JSON that carries no depth data
//! (subscription acks, heartbeats) fails with [`DecodeError::MissingFields`];
//! depth data with an unusable level fails with [`DecodeError::InvalidLevel`].
//! None of these are fatal to the caller's loop.

use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::types::messages::{WireLevel, WireTimestamp};
use crate::types::{DepthUpdate, PriceLevel, Side};

/// Maximum number of characters of a frame quoted in log events
pub const PREVIEW_CHARS: usize = 100;

/// Decode one feed frame
///
/// Both `asks` and `bids` must be present for the frame to count as a depth
/// update; either may be an empty array.
///
/// # Example
///
/// ```rust
/// use l2_book_feed::decoder::decode;
///
/// let update = decode(br#"{"asks":[["100.5","2"]],"bids":[[99.9,3]]}"#).unwrap();
/// assert_eq!(update.asks[0].price, 100.5);
/// assert_eq!(update.bids[0].size, 3.0);
/// ```
///
/// # Errors
///
/// See the module documentation.
pub fn decode(raw: &[u8]) -> Result<DepthUpdate, DecodeError> {
    let value: Value = serde_json::from_slice(raw)?;

    let Value::Object(mut object) = value else {
        return Err(DecodeError::MissingFields);
    };

    let (Some(asks), Some(bids)) = (object.remove("asks"), object.remove("bids")) else {
        return Err(DecodeError::MissingFields);
    };

    Ok(DepthUpdate {
        asks: decode_side(Side::Ask, asks)?,
        bids: decode_side(Side::Bid, bids)?,
        symbol: take_string(&mut object, "symbol"),
        exchange: take_string(&mut object, "exchange"),
        timestamp: object
            .remove("timestamp")
            .and_then(|v| serde_json::from_value::<WireTimestamp>(v).ok())
            .map(WireTimestamp::into_string),
    })
}

fn decode_side(side: Side, value: Value) -> Result<Vec<PriceLevel>, DecodeError> {
    let Value::Array(entries) = value else {
        return Err(DecodeError::InvalidLevel {
            side: side.as_str(),
            index: 0,
            reason: "expected an array of levels".to_string(),
        });
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| decode_level(side, index, entry))
        .collect()
}

fn decode_level(side: Side, index: usize, entry: Value) -> Result<PriceLevel, DecodeError> {
    let invalid = |reason: String| DecodeError::InvalidLevel {
        side: side.as_str(),
        index,
        reason,
    };

    let level: WireLevel = serde_json::from_value(entry)
        .map_err(|_| invalid("expected [price, size] of numbers or numeric strings".into()))?;

    // Venues may append extra columns (order count, liquidations); only the
    // first two are meaningful here.
    let [price, size, ..] = level.as_slice() else {
        return Err(invalid(format!("expected 2 fields, got {}", level.len())));
    };

    let price = price
        .to_f64()
        .ok_or_else(|| invalid(format!("non-numeric price {price:?}")))?;
    let size = size
        .to_f64()
        .ok_or_else(|| invalid(format!("non-numeric size {size:?}")))?;

    if !price.is_finite() || price < 0.0 {
        return Err(invalid(format!("price out of range: {price}")));
    }
    if !size.is_finite() || size < 0.0 {
        return Err(invalid(format!("size out of range: {size}")));
    }

    Ok(PriceLevel::new(price, size))
}

fn take_string(object: &mut Map<String, Value>, key: &str) -> Option<String> {
    match object.remove(key)? {
        Value::String(s) => Some(s),
        _ => None,
    }
}

/// First [`PREVIEW_CHARS`] characters of a frame, for log events
pub fn preview(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .take(PREVIEW_CHARS)
        .collect()
}
