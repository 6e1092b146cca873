//! Domain layer - Core gateway types with no external integrations.

/// Order commands, validation, and dispatch outcomes.
pub mod order;

/// Session identity announced at channel registration.
pub mod session;

pub use order::{
    DispatchResult, DispatchStatus, OrderCommand, OrderKind, OrderSide, ValidOrder,
    ValidationError,
};
pub use session::Session;
