//! Signal parser.
//!
//! Turns raw message text into a [`Signal`]. Parsing is pure: it never
//! touches dedup or position state.
//!
//! Two formats are understood, both exactly five lines of `Key: value`:
//!
//! ```text
//! plain                 tagged (marker = #BTCUSD)
//! -----                 -------------------------
//! Pair: BTCUSD          Pair: BTCUSD
//! Type: Buy             Type: Buy
//! ...                   Entry: 100
//! ...                   Size: 50 USD
//! ...                   #BTCUSD
//! ```
//!
//! Keys are matched case-insensitively. `Entry`/`Size` are required by the
//! tagged format and honoured by the plain format when present.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

use crate::entities::{InboundMessage, Signal};
use crate::value_objects::{Direction, Price, Quantity};

/// Number of lines in every accepted signal
pub const SIGNAL_LINE_COUNT: usize = 5;

const KEY_PAIR: &str = "pair";
const KEY_TYPE: &str = "type";
const KEY_ENTRY: &str = "entry";
const KEY_SIZE: &str = "size";

/// Accepted message layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalFormat {
    /// `Pair` and `Type` lines; other lines optional
    Plain,
    /// `Pair`, `Type`, `Entry`, `Size` lines plus a literal marker token
    Tagged {
        /// Instrument marker, e.g. `#BTCUSD`
        marker: String,
    },
}

impl SignalFormat {
    /// Tagged format with the given marker
    pub fn tagged(marker: impl Into<String>) -> Self {
        Self::Tagged { marker: marker.into() }
    }
}

/// Why a message is not a signal
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Signals are exactly five lines
    #[error("expected {expected} lines, got {actual}")]
    WrongLineCount {
        /// Required line count
        expected: usize,
        /// Lines found
        actual: usize,
    },

    /// A required `Key:` line is absent
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// The instrument marker token is absent
    #[error("missing marker token '{0}'")]
    MissingMarker(String),

    /// `Type` is neither buy nor sell
    #[error("invalid trade type '{0}'")]
    InvalidDirection(String),

    /// A numeric field is not a positive decimal
    #[error("invalid {field} value '{value}'")]
    InvalidNumber {
        /// Field name
        field: &'static str,
        /// Raw value
        value: String,
    },
}

/// Parse a message into a signal.
///
/// # Errors
/// See [`ParseError`]; the message is never partially accepted.
pub fn parse_signal(message: &InboundMessage, format: &SignalFormat) -> Result<Signal, ParseError> {
    let lines: Vec<&str> = message.text.trim().lines().collect();
    if lines.len() != SIGNAL_LINE_COUNT {
        return Err(ParseError::WrongLineCount {
            expected: SIGNAL_LINE_COUNT,
            actual: lines.len(),
        });
    }

    if let SignalFormat::Tagged { marker } = format {
        if !message.text.contains(marker.as_str()) {
            return Err(ParseError::MissingMarker(marker.clone()));
        }
    }

    let fields = collect_fields(&lines);

    let pair = fields
        .get(KEY_PAIR)
        .filter(|v| !v.is_empty())
        .ok_or(ParseError::MissingField(KEY_PAIR))?
        .to_string();

    let raw_type = fields.get(KEY_TYPE).ok_or(ParseError::MissingField(KEY_TYPE))?;
    let direction = Direction::from_str(raw_type)
        .map_err(|_| ParseError::InvalidDirection(raw_type.to_string()))?;

    let required = matches!(format, SignalFormat::Tagged { .. });

    let entry_price = match fields.get(KEY_ENTRY) {
        Some(raw) => Some(parse_price(raw)?),
        None if required => return Err(ParseError::MissingField(KEY_ENTRY)),
        None => None,
    };

    let size = match fields.get(KEY_SIZE) {
        Some(raw) => Some(parse_size(raw)?),
        None if required => return Err(ParseError::MissingField(KEY_SIZE)),
        None => None,
    };

    Ok(Signal {
        id: message.id.clone(),
        pair,
        direction,
        entry_price,
        size,
        text: message.text.trim().to_string(),
    })
}

/// Map lowercase key → trimmed value. First occurrence wins.
fn collect_fields<'a>(lines: &[&'a str]) -> HashMap<String, &'a str> {
    let mut fields = HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            fields
                .entry(key.trim().to_lowercase())
                .or_insert_with(|| value.trim());
        }
    }
    fields
}

fn parse_decimal(field: &'static str, raw: &str) -> Result<Decimal, ParseError> {
    Decimal::from_str(raw).map_err(|_| ParseError::InvalidNumber {
        field,
        value: raw.to_string(),
    })
}

fn parse_price(raw: &str) -> Result<Price, ParseError> {
    let value = parse_decimal(KEY_ENTRY, raw)?;
    Price::new(value).map_err(|_| ParseError::InvalidNumber {
        field: KEY_ENTRY,
        value: raw.to_string(),
    })
}

/// Sizes may carry a trailing unit (`50 USD`).
fn parse_size(raw: &str) -> Result<Quantity, ParseError> {
    let amount = raw.split_whitespace().next().unwrap_or_default();
    let value = parse_decimal(KEY_SIZE, amount).map_err(|_| ParseError::InvalidNumber {
        field: KEY_SIZE,
        value: raw.to_string(),
    })?;
    Quantity::new(value).map_err(|_| ParseError::InvalidNumber {
        field: KEY_SIZE,
        value: raw.to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::MessageId;
    use rust_decimal_macros::dec;

    fn message(text: &str) -> InboundMessage {
        InboundMessage::new(MessageId::new("m-1").unwrap(), text)
    }

    fn tagged() -> SignalFormat {
        SignalFormat::tagged("#BTCUSD")
    }

    const TAGGED_BUY: &str = "Pair: BTCUSD\nType: Buy\nEntry: 100\nSize: 50 USD\n#BTCUSD";

    #[test]
    fn test_parse_tagged_signal() {
        let signal = parse_signal(&message(TAGGED_BUY), &tagged()).unwrap();

        assert_eq!(signal.id.as_str(), "m-1");
        assert_eq!(signal.pair, "BTCUSD");
        assert_eq!(signal.direction, Direction::Buy);
        assert_eq!(signal.entry_price.unwrap().as_decimal(), dec!(100));
        assert_eq!(signal.size.unwrap().as_decimal(), dec!(50));
    }

    #[test]
    fn test_parse_plain_signal_without_numbers() {
        let text = "Pair: BTCUSD\nType: SELL\nTP: soon\nSL: later\nGood luck";
        let signal = parse_signal(&message(text), &SignalFormat::Plain).unwrap();

        assert_eq!(signal.direction, Direction::Sell);
        assert!(signal.entry_price.is_none());
        assert!(signal.size.is_none());
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let text = "PAIR: BTCUSD\ntype: sell\nENTRY: 110.5\nsize: 50\n#BTCUSD";
        let signal = parse_signal(&message(text), &tagged()).unwrap();

        assert_eq!(signal.direction, Direction::Sell);
        assert_eq!(signal.entry_price.unwrap().as_decimal(), dec!(110.5));
    }

    #[test]
    fn test_surrounding_whitespace_and_crlf() {
        let text = "\n  Pair: BTCUSD\r\nType: Buy\r\nEntry: 100\r\nSize: 50 USD\r\n#BTCUSD\n\n";
        assert!(parse_signal(&message(text), &tagged()).is_ok());
    }

    #[test]
    fn test_rejects_wrong_line_count() {
        let four = "Pair: BTCUSD\nType: Buy\nEntry: 100\nSize: 50 USD #BTCUSD";
        let six = "Pair: BTCUSD\nType: Buy\nEntry: 100\nSize: 50 USD\n#BTCUSD\nextra";

        assert_eq!(
            parse_signal(&message(four), &tagged()),
            Err(ParseError::WrongLineCount { expected: 5, actual: 4 })
        );
        assert_eq!(
            parse_signal(&message(six), &tagged()),
            Err(ParseError::WrongLineCount { expected: 5, actual: 6 })
        );
        assert!(parse_signal(&message(""), &SignalFormat::Plain).is_err());
    }

    #[test]
    fn test_rejects_missing_fields() {
        let no_type = "Pair: BTCUSD\nSide: Buy\nEntry: 100\nSize: 50 USD\n#BTCUSD";
        let no_entry = "Pair: BTCUSD\nType: Buy\nPrice: 100\nSize: 50 USD\n#BTCUSD";
        let no_pair = "Symbol: BTCUSD\nType: Buy\nEntry: 100\nSize: 50 USD\n#BTCUSD";

        assert_eq!(
            parse_signal(&message(no_type), &tagged()),
            Err(ParseError::MissingField("type"))
        );
        assert_eq!(
            parse_signal(&message(no_entry), &tagged()),
            Err(ParseError::MissingField("entry"))
        );
        assert_eq!(
            parse_signal(&message(no_pair), &tagged()),
            Err(ParseError::MissingField("pair"))
        );
    }

    #[test]
    fn test_rejects_missing_marker() {
        let text = "Pair: BTCUSD\nType: Buy\nEntry: 100\nSize: 50 USD\n#ETHUSD";
        assert_eq!(
            parse_signal(&message(text), &tagged()),
            Err(ParseError::MissingMarker("#BTCUSD".to_string()))
        );
    }

    #[test]
    fn test_rejects_unknown_direction() {
        let text = "Pair: BTCUSD\nType: Hold\nEntry: 100\nSize: 50 USD\n#BTCUSD";
        assert_eq!(
            parse_signal(&message(text), &tagged()),
            Err(ParseError::InvalidDirection("Hold".to_string()))
        );
    }

    #[test]
    fn test_rejects_unparseable_numbers() {
        let bad_entry = "Pair: BTCUSD\nType: Buy\nEntry: abc\nSize: 50 USD\n#BTCUSD";
        let bad_size = "Pair: BTCUSD\nType: Buy\nEntry: 100\nSize: fifty USD\n#BTCUSD";
        let zero_entry = "Pair: BTCUSD\nType: Buy\nEntry: 0\nSize: 50 USD\n#BTCUSD";

        assert!(matches!(
            parse_signal(&message(bad_entry), &tagged()),
            Err(ParseError::InvalidNumber { field: "entry", .. })
        ));
        assert!(matches!(
            parse_signal(&message(bad_size), &tagged()),
            Err(ParseError::InvalidNumber { field: "size", .. })
        ));
        assert!(matches!(
            parse_signal(&message(zero_entry), &tagged()),
            Err(ParseError::InvalidNumber { field: "entry", .. })
        ));
    }

    #[test]
    fn test_plain_format_still_validates_present_numbers() {
        let text = "Pair: BTCUSD\nType: Buy\nEntry: n/a\nx\ny";
        assert!(matches!(
            parse_signal(&message(text), &SignalFormat::Plain),
            Err(ParseError::InvalidNumber { field: "entry", .. })
        ));
    }
}
