/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 负责计算网络（computation network）的构建、校验、求值与求梯度
 */

mod config;
mod descriptor;
mod display;
mod graph;
pub mod layout;
mod nodes;

pub use config::NetworkConfig;
pub use descriptor::{LoopDescriptor, NetworkDescriptor, NodeDescriptor};
pub(in crate::nn) use display::format_node_display;
pub use graph::{ComputationNetwork, GradientOptions, NetworkError, NodeRole, Phase, RecurrentInfo, TraceEvent};
pub use layout::{FrameRange, MbLayout, MbLayoutPtr, SteppingDirection};
pub use nodes::{ImageLayout, Init, NodeId, NodeStats};

#[cfg(test)]
mod tests;
