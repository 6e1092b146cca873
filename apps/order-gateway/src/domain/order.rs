//! Order Command Types
//!
//! Wire-shaped order commands received on the control channel, their
//! validated form handed to the execution backend, and the dispatch
//! outcome used to build acknowledgements.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Value Objects
// =============================================================================

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl OrderSide {
    /// Parse an upstream side token. Accepts both the single-letter and
    /// spelled-out forms, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "B" | "BUY" => Some(Self::Buy),
            "S" | "SELL" => Some(Self::Sell),
            _ => None,
        }
    }

    /// Canonical side name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

/// Order kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    /// Market order, no price fields.
    #[default]
    Market,
    /// Limit order, requires a limit price.
    Limit,
}

// =============================================================================
// Order Command (wire shape)
// =============================================================================

/// An order command as received from the order-management service.
///
/// All fields are optional at the wire level so that a missing field
/// surfaces as a `ValidationError` in the acknowledgement rather than a
/// dropped frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCommand {
    /// Trading account the order targets.
    #[serde(default)]
    pub account: Option<String>,
    /// Instrument symbol.
    #[serde(default)]
    pub symbol: Option<String>,
    /// Side token ("B", "BUY", "S", "SELL").
    #[serde(default)]
    pub side: Option<String>,
    /// Quantity to trade.
    #[serde(default)]
    pub quantity: Option<Decimal>,
    /// Order kind, defaults to market.
    #[serde(default)]
    pub order_kind: OrderKind,
    /// Limit price, required for limit orders.
    #[serde(default)]
    pub limit_price: Option<Decimal>,
    /// Time in force, passed through to the backend.
    #[serde(default)]
    pub time_in_force: Option<String>,
    /// Venue route, passed through to the backend.
    #[serde(default)]
    pub route: Option<String>,
    /// Caller-supplied idempotency key.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl OrderCommand {
    /// Validate the command and produce the form handed to the backend.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if a required field is missing or
    /// malformed for the command's order kind. The backend is never
    /// consulted for an invalid command.
    pub fn validate(&self) -> Result<ValidOrder, ValidationError> {
        let account = non_empty(self.account.as_deref())
            .ok_or(ValidationError::MissingField("account"))?;
        let symbol =
            non_empty(self.symbol.as_deref()).ok_or(ValidationError::MissingField("symbol"))?;
        let side_token =
            non_empty(self.side.as_deref()).ok_or(ValidationError::MissingField("side"))?;
        let side = OrderSide::parse(&side_token)
            .ok_or_else(|| ValidationError::InvalidSide(side_token.clone()))?;

        let quantity = self
            .quantity
            .ok_or(ValidationError::MissingField("quantity"))?;
        if quantity <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveQuantity);
        }

        let limit_price = match self.order_kind {
            OrderKind::Market => None,
            OrderKind::Limit => {
                let price = self
                    .limit_price
                    .ok_or(ValidationError::MissingLimitPrice)?;
                if price <= Decimal::ZERO {
                    return Err(ValidationError::MissingLimitPrice);
                }
                Some(price)
            }
        };

        Ok(ValidOrder {
            account,
            symbol: symbol.to_uppercase(),
            side,
            quantity,
            kind: self.order_kind,
            limit_price,
            time_in_force: self
                .time_in_force
                .clone()
                .unwrap_or_else(|| "DAY".to_string()),
            route: self.route.clone().unwrap_or_else(|| "DEMO".to_string()),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// A validated order, ready for submission to the execution backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidOrder {
    /// Trading account.
    pub account: String,
    /// Uppercased instrument symbol.
    pub symbol: String,
    /// Normalized side.
    pub side: OrderSide,
    /// Positive quantity.
    pub quantity: Decimal,
    /// Order kind.
    pub kind: OrderKind,
    /// Limit price, present iff the kind requires one.
    pub limit_price: Option<Decimal>,
    /// Time in force.
    pub time_in_force: String,
    /// Venue route.
    pub route: String,
}

// =============================================================================
// Validation Errors
// =============================================================================

/// A command failed field validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Side token is not one of B/BUY/S/SELL.
    #[error("unrecognized side: {0}")]
    InvalidSide(String),

    /// Quantity is zero or negative.
    #[error("quantity must be positive")]
    NonPositiveQuantity,

    /// Limit order without a usable limit price.
    #[error("limit orders require a positive limitPrice")]
    MissingLimitPrice,
}

// =============================================================================
// Dispatch Result
// =============================================================================

/// Outcome of one dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DispatchStatus {
    /// Backend accepted the order.
    Submitted,
    /// Command failed; nothing was persisted.
    Error,
    /// Duplicate key; the stored result was returned without a backend call.
    IdempotentReplay,
}

impl DispatchStatus {
    /// Status name for metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Error => "error",
            Self::IdempotentReplay => "idempotent_replay",
        }
    }
}

/// Result of dispatching one `OrderCommand`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    /// Final status.
    pub status: DispatchStatus,
    /// Backend order id when one exists.
    pub result_id: Option<String>,
    /// Human-readable detail.
    pub detail: String,
}

impl DispatchResult {
    /// Build an error result from any displayable cause.
    pub fn error(detail: impl std::fmt::Display) -> Self {
        Self {
            status: DispatchStatus::Error,
            result_id: None,
            detail: detail.to_string(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
