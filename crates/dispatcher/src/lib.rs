//! # Dispatcher
//!
//! 消息投递模块。
//!
//! 负责：
//! - 定时从 `PersistentQueueStore` 取出下一条待发送记录
//! - 进程级 `RateLimiter` 保证设备调用间隔
//! - 单飞 (single-flight) 投递，带有限次内联重试
//! - 投递结果回写 store（发送成功 / 尝试次数 / 淘汰）

pub mod controller;
pub mod error;
pub mod metrics;
pub mod rate_limiter;
pub mod retry;
pub mod transports;

pub use contracts::{DeliveryTransport, RetryPolicy};
pub use controller::{DispatchController, TickOutcome};
pub use error::DispatcherError;
pub use metrics::{ControllerMetrics, ControllerSnapshot};
pub use rate_limiter::RateLimiter;
pub use retry::deliver_with_retry;
pub use transports::{create_transport, BoardTransport, ConsoleTransport, VestaboardTransport};
