//! Shared types for the tab sync server
//!
//! Types used by both the server and terminal clients: the table order
//! domain model, the JSON wire protocol and command error codes.

pub mod error;
pub mod message;
pub mod order;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use error::{CommandError, CommandErrorCode};
pub use message::{ClientCommand, ServerEvent};
pub use order::{LineItem, Money, OrderStatus, TableNumber, TableOrder};
