/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 计算网络模块：构建、循环识别、校验、前向求值与反向求梯度
 *
 * 公开 API：
 * - `ComputationNetwork`: 网络本身（节点的所有者）
 * - `NetworkError`: 错误类型
 * - `RecurrentInfo` / `GradientOptions` / `NodeRole` / `TraceEvent`: 相关类型
 */

mod error;
mod inner;
mod types;

pub use error::NetworkError;
pub use inner::ComputationNetwork;
pub use types::{GradientOptions, NodeRole, Phase, RecurrentInfo, TraceEvent};
