/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 计算网络模块的类型定义
 */

use crate::nn::NodeId;
use crate::nn::layout::{FrameRange, SteppingDirection};
use crate::tensor::Tensor;
use serde::Serialize;

/// 一个被识别出的循环（强连通分量），求值时作为整体逐帧执行
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrentInfo {
    /// 成员节点（按节点ID排序）
    pub recurrent_nodes: Vec<NodeId>,
    /// 同一批成员，按循环内的前向求值顺序排列（去掉延迟边后的拓扑序）
    pub recurrent_nodes_for_forward: Vec<NodeId>,
    pub stepping_direction: SteppingDirection,
    /// 本次`evaluate`中是否已执行过
    pub completed_evaluate: bool,
    /// 本次`compute_gradient`中是否已执行过
    pub completed_gradient: bool,
}

impl RecurrentInfo {
    pub fn contains(&self, id: NodeId) -> bool {
        self.recurrent_nodes.binary_search(&id).is_ok()
    }
}

/// `compute_gradient`的选项
#[derive(Debug, Clone, PartialEq)]
pub struct GradientOptions {
    /// 把根节点梯度置为`1×1`的1（准则节点为标量）
    pub reset_root_to_one: bool,
    /// 用给定值覆盖根节点梯度；与`reset_root_to_one`同时给出时以此为准
    pub initial_root_gradient: Option<Tensor>,
    /// 先把子网络中所有梯度清零
    pub clear_gradients: bool,
    /// 结束后重置求值时间戳，使下次`evaluate`重新计算所有节点
    pub reset_timestamps: bool,
}

impl Default for GradientOptions {
    fn default() -> Self {
        Self {
            reset_root_to_one: true,
            initial_root_gradient: None,
            clear_gradients: true,
            reset_timestamps: false,
        }
    }
}

/// 节点在网络中的角色（用于整网校验）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeRole {
    Feature,
    Label,
    /// 训练准则（标量损失）
    Criterion,
    Output,
    Evaluation,
}

/// 执行轨迹中事件所属的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Evaluate,
    Gradient,
}

/// 执行轨迹中的一条记录：某节点在某帧上被执行了一次前向或反向计算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub node: NodeId,
    pub phase: Phase,
    pub frame: FrameRange,
}
