//! # compnet
//!
//! 计算网络（computation network）的求值核心：给定由运算节点组成的有向图
//! （允许经`PastValue`/`FutureValue`延迟节点闭合的环），负责
//! - 求出每个根节点的求值顺序，并把环识别为按时间步逐帧执行的循环；
//! - 多轮惰性校验，推断出每个节点的维度与小批量布局；
//! - 基于时间戳只重新计算过期节点的前向求值；
//! - 按求值顺序的逆序（循环内逐帧倒序）反向传播梯度。
//!
//! 网络自带一组最小的运算节点（`Times`、`Plus`、`Sigmoid`、`SquareError`等）
//! 与基于 ndarray 的二维张量。
//!

pub mod nn;
pub mod tensor;
pub mod utils;
