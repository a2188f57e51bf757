/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : ComputationNetwork 计算网络的底层实现
 *
 * 各 impl 块分散在子模块中：
 * - core.rs: 基础操作、访问器、时间戳
 * - node_builders.rs: new_*_node
 * - traversal.rs: 求值顺序/梯度顺序、强连通分量
 * - recurrent.rs: 循环识别
 * - validate.rs: 多轮校验与构建缓存
 * - evaluate.rs: 前向求值
 * - backward.rs: 反向求梯度
 * - describe.rs: 打印与描述
 */

mod backward;
mod core;
mod describe;
mod evaluate;
mod node_builders;
mod recurrent;
mod traversal;
mod validate;

use super::types::{RecurrentInfo, TraceEvent};
use crate::nn::NetworkConfig;
use crate::nn::NodeId;
use crate::nn::layout::MbLayoutPtr;
use crate::nn::nodes::NodeHandle;
use rand::rngs::StdRng;
use std::collections::{HashMap, HashSet};

/// 计算网络：节点的所有者，负责组织各节点的校验、前向求值与反向求梯度
///
/// 节点以 ID 为键存放在网络中，子节点（输入）以 ID 引用，
/// 因此节点之间的环（经延迟节点闭合）不会造成所有权上的环。
pub struct ComputationNetwork {
    pub(in crate::nn::graph) config: NetworkConfig,
    pub(in crate::nn::graph) nodes: HashMap<NodeId, NodeHandle>,
    pub(in crate::nn::graph) next_id: u64,
    /// 整个网络共享的小批量布局，由读取器在两次调用之间更新
    pub(in crate::nn::graph) mb_layout: MbLayoutPtr,
    /// 求值时间戳计数器（单调递增）
    pub(in crate::nn::graph) time_stamp_counter: u64,
    /// 网络级别的随机数生成器（用于参数初始化）
    pub(in crate::nn::graph) rng: StdRng,

    // ========== 缓存（clear_cache 时清空） ==========
    pub(in crate::nn::graph) recurrent_info: Vec<RecurrentInfo>,
    /// 已构建并校验过的根节点
    pub(in crate::nn::graph) built: HashSet<NodeId>,
    /// 每个根节点的求值顺序
    pub(in crate::nn::graph) eval_orders: HashMap<NodeId, Vec<NodeId>>,
    pub(in crate::nn::graph) input_nodes: HashMap<NodeId, Vec<NodeId>>,
    pub(in crate::nn::graph) learnable_parameters: HashMap<NodeId, Vec<NodeId>>,

    // ========== 节点角色 ==========
    pub(in crate::nn::graph) feature_nodes: Vec<NodeId>,
    pub(in crate::nn::graph) label_nodes: Vec<NodeId>,
    pub(in crate::nn::graph) criterion_nodes: Vec<NodeId>,
    pub(in crate::nn::graph) output_nodes: Vec<NodeId>,
    pub(in crate::nn::graph) evaluation_nodes: Vec<NodeId>,

    /// 执行轨迹（仅在`config.trace_execution`为true时记录）
    pub(in crate::nn::graph) execution_trace: Vec<TraceEvent>,
}
