//! Table order management
//!
//! - [`money`]: 订单行校验与合计计算
//! - [`validator`]: 纯函数前置条件检查
//! - [`registry`]: 按桌台加锁的权威状态

pub mod error;
pub mod money;
pub mod registry;
pub mod validator;

pub use error::{OrderError, OrderResult};
pub use registry::{RegistryEvent, TableRegistry, TransferOutcome};
pub use validator::CloseConfirmation;
