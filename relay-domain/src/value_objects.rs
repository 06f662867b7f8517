//! Value Objects for the Relay Domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Price must be positive
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Quantity must be positive
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Leverage must be a positive multiplier
    #[error("Invalid leverage: {0}")]
    InvalidLeverage(String),

    /// Direction must be buy or sell
    #[error("Invalid direction: {0}")]
    InvalidDirection(String),

    /// Message identifiers must fit on a single dedup record line
    #[error("Invalid message id: {0}")]
    InvalidMessageId(String),

    /// Ledger arithmetic left the representable range
    #[error("Invalid balance: {0}")]
    InvalidBalance(String),
}

// =============================================================================
// Price
// =============================================================================

/// Price represents a positive decimal price
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    /// Create a new Price with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPrice` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice("Price must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// Quantity represents a positive decimal size
///
/// Signals state sizes in quote currency (e.g. `50 USD`); positions record
/// the leveraged notional.
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Create a new Quantity with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidQuantity` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity("Quantity must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Leverage
// =============================================================================

/// Fixed leverage multiplier applied to every signal size.
///
/// # Example
///
/// ```
/// # use relay_domain::value_objects::{Leverage, Quantity};
/// # use rust_decimal_macros::dec;
/// let leverage = Leverage::new(10).unwrap();
/// let size = leverage.apply(Quantity::new(dec!(50)).unwrap()).unwrap();
/// assert_eq!(size.as_decimal(), dec!(500));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leverage(u32);

impl Leverage {
    /// Create a new leverage multiplier.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidLeverage` if multiplier is zero
    pub fn new(multiplier: u32) -> Result<Self, DomainError> {
        if multiplier == 0 {
            return Err(DomainError::InvalidLeverage("Leverage must be at least 1x".to_string()));
        }
        Ok(Self(multiplier))
    }

    /// Get the raw multiplier
    pub fn multiplier(&self) -> u32 {
        self.0
    }

    /// Scale a stated size into the leveraged notional.
    pub fn apply(&self, size: Quantity) -> Result<Quantity, DomainError> {
        let leveraged = size
            .as_decimal()
            .checked_mul(Decimal::from(self.0))
            .ok_or_else(|| DomainError::InvalidQuantity(format!("{} x {} overflows", size, self.0)))?;
        Quantity::new(leveraged)
    }
}

impl fmt::Display for Leverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}

// =============================================================================
// Direction / Side
// =============================================================================

/// Direction requested by a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Go (or stay) long
    Buy,
    /// Go (or stay) short
    Sell,
}

impl Direction {
    /// Position side this direction asks for
    ///
    /// Buy → Long, Sell → Short
    pub fn target_side(&self) -> Side {
        match self {
            Direction::Buy => Side::Long,
            Direction::Sell => Side::Short,
        }
    }
}

impl FromStr for Direction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(Direction::Buy),
            "sell" => Ok(Direction::Sell),
            other => Err(DomainError::InvalidDirection(other.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

/// Side represents the position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// Long position (buy low, sell high)
    Long,
    /// Short position (sell high, buy low)
    Short,
}

impl Side {
    /// Order direction that opens this side
    ///
    /// Long → Buy, Short → Sell
    pub fn entry_direction(&self) -> Direction {
        match self {
            Side::Long => Direction::Buy,
            Side::Short => Direction::Sell,
        }
    }

    /// Order direction that closes this side
    ///
    /// Long → Sell, Short → Buy
    pub fn exit_direction(&self) -> Direction {
        match self {
            Side::Long => Direction::Sell,
            Side::Short => Direction::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

// =============================================================================
// MessageId
// =============================================================================

/// Opaque identifier of an inbound message.
///
/// # Invariants
/// - Non-empty after trimming
/// - No control characters (one identifier per dedup record line)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageId(String);

impl MessageId {
    /// Create a MessageId with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidMessageId` if the id is blank or contains
    /// control characters.
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let trimmed = value.trim();

        if trimmed.is_empty() {
            return Err(DomainError::InvalidMessageId("Message id must not be empty".to_string()));
        }

        if trimmed.chars().any(char::is_control) {
            return Err(DomainError::InvalidMessageId(format!(
                "Message id contains control characters: {:?}",
                trimmed
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MessageId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_must_be_positive() {
        assert!(Price::new(dec!(100)).is_ok());
        assert!(Price::new(dec!(0)).is_err());
        assert!(Price::new(dec!(-1)).is_err());
    }

    #[test]
    fn test_quantity_must_be_positive() {
        assert!(Quantity::new(dec!(0.05)).is_ok());
        assert!(matches!(Quantity::new(dec!(0)), Err(DomainError::InvalidQuantity(_))));
    }

    #[test]
    fn test_leverage_rejects_zero() {
        assert!(matches!(Leverage::new(0), Err(DomainError::InvalidLeverage(_))));
        assert_eq!(Leverage::new(10).unwrap().to_string(), "10x");
    }

    #[test]
    fn test_leverage_apply() {
        let leverage = Leverage::new(10).unwrap();
        let size = leverage.apply(Quantity::new(dec!(50)).unwrap()).unwrap();
        assert_eq!(size.as_decimal(), dec!(500));

        let unit = Leverage::new(1).unwrap();
        let size = unit.apply(Quantity::new(dec!(0.05)).unwrap()).unwrap();
        assert_eq!(size.as_decimal(), dec!(0.05));
    }

    #[test]
    fn test_direction_parse_is_case_insensitive() {
        assert_eq!("Buy".parse::<Direction>().unwrap(), Direction::Buy);
        assert_eq!(" SELL ".parse::<Direction>().unwrap(), Direction::Sell);
        assert!("hold".parse::<Direction>().is_err());
    }

    #[test]
    fn test_direction_target_side() {
        assert_eq!(Direction::Buy.target_side(), Side::Long);
        assert_eq!(Direction::Sell.target_side(), Side::Short);
        assert_eq!(Side::Long.exit_direction(), Direction::Sell);
        assert_eq!(Side::Short.entry_direction(), Direction::Sell);
    }

    #[test]
    fn test_message_id_validation() {
        assert_eq!(MessageId::new("  tg:-100:42 ").unwrap().as_str(), "tg:-100:42");
        assert!(MessageId::new("   ").is_err());
        assert!(MessageId::new("a\nb").is_err());
    }

    #[test]
    fn test_message_id_serde_validates() {
        let id: MessageId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(id.as_str(), "abc");
        assert!(serde_json::from_str::<MessageId>("\"\"").is_err());
    }
}
