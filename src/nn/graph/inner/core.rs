/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : ComputationNetwork 基础操作：创建、访问器、节点角色、时间戳、缓存
 */

use super::super::error::NetworkError;
use super::super::types::{NodeRole, Phase, TraceEvent};
use super::ComputationNetwork;
use crate::nn::layout::{FrameRange, MbLayout, MbLayoutPtr};
use crate::nn::nodes::raw_node::{NodeType, TraitNode};
use crate::nn::nodes::{NodeHandle, NodeStats};
use crate::nn::{NetworkConfig, NodeId};
use crate::tensor::Tensor;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{HashMap, HashSet};

impl Default for ComputationNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputationNetwork {
    // ========== 创建 ==========

    pub fn new() -> Self {
        Self::with_config(NetworkConfig::default())
    }

    /// 创建一个带固定种子的网络（确保参数初始化可重复）
    pub fn new_with_seed(seed: u64) -> Self {
        Self::with_config(NetworkConfig {
            seed: Some(seed),
            ..NetworkConfig::default()
        })
    }

    pub fn with_config(config: NetworkConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            nodes: HashMap::new(),
            next_id: 0,
            mb_layout: MbLayout::new_shared(0, 0),
            time_stamp_counter: 0,
            rng,
            recurrent_info: Vec::new(),
            built: HashSet::new(),
            eval_orders: HashMap::new(),
            input_nodes: HashMap::new(),
            learnable_parameters: HashMap::new(),
            feature_nodes: Vec::new(),
            label_nodes: Vec::new(),
            criterion_nodes: Vec::new(),
            output_nodes: Vec::new(),
            evaluation_nodes: Vec::new(),
            execution_trace: Vec::new(),
        }
    }

    // ========== 基础访问器 ==========

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub const fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// 网络共享的小批量布局。读取器在两次`evaluate`之间通过它设置`(T, S)`与序列边界。
    pub const fn mb_layout(&self) -> &MbLayoutPtr {
        &self.mb_layout
    }

    /// 设置小批量布局的`(T, S)`（所有序列在本小批量内开始并结束）
    pub fn set_mb_layout(&mut self, num_time_steps: usize, num_parallel_sequences: usize) {
        self.mb_layout
            .borrow_mut()
            .init(num_time_steps, num_parallel_sequences, true);
    }

    pub fn nodes_count(&self) -> usize {
        self.nodes.len()
    }

    /// 所有节点的 ID（升序）
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(in crate::nn) fn get_node(&self, id: NodeId) -> Result<&NodeHandle, NetworkError> {
        self.nodes.get(&id).ok_or(NetworkError::NodeNotFound(id))
    }

    pub(in crate::nn) fn get_node_mut(&mut self, id: NodeId) -> Result<&mut NodeHandle, NetworkError> {
        self.nodes.get_mut(&id).ok_or(NetworkError::NodeNotFound(id))
    }

    /// 按名称查找节点
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|node| node.name() == name)
            .map(NodeHandle::id)
    }

    pub fn get_node_name(&self, id: NodeId) -> Result<&str, NetworkError> {
        Ok(self.get_node(id)?.name())
    }

    pub fn get_node_operation(&self, id: NodeId) -> Result<&'static str, NetworkError> {
        Ok(self.get_node(id)?.operation_name())
    }

    pub fn get_node_children(&self, id: NodeId) -> Result<Vec<NodeId>, NetworkError> {
        Ok(self.get_node(id)?.children().to_vec())
    }

    pub fn get_node_value(&self, id: NodeId) -> Result<&Tensor, NetworkError> {
        Ok(self.get_node(id)?.value())
    }

    pub fn get_node_grad(&self, id: NodeId) -> Result<&Tensor, NetworkError> {
        Ok(self.get_node(id)?.grad())
    }

    /// 节点值的`(rows, cols)`
    pub fn get_node_dims(&self, id: NodeId) -> Result<(usize, usize), NetworkError> {
        Ok(self.get_node(id)?.dims())
    }

    pub fn get_node_stats(&self, id: NodeId) -> Result<NodeStats, NetworkError> {
        Ok(self.get_node(id)?.stats())
    }

    pub fn get_node_eval_time_stamp(&self, id: NodeId) -> Result<u64, NetworkError> {
        Ok(self.get_node(id)?.eval_time_stamp())
    }

    pub fn node_needs_gradient(&self, id: NodeId) -> Result<bool, NetworkError> {
        Ok(self.get_node(id)?.needs_gradient())
    }

    pub fn node_has_mb_layout(&self, id: NodeId) -> Result<bool, NetworkError> {
        Ok(self.get_node(id)?.has_mb_layout())
    }

    pub fn is_node_part_of_loop(&self, id: NodeId) -> Result<bool, NetworkError> {
        Ok(self.get_node(id)?.is_part_of_loop())
    }

    /// 设置节点的值（读取器写入输入、优化器更新参数时使用），并更新其时间戳，
    /// 使依赖它的节点在下次`evaluate`时被重新计算
    pub fn set_node_value(&mut self, id: NodeId, value: &Tensor) -> Result<(), NetworkError> {
        self.get_node_mut(id)?.set_value(value);
        self.update_eval_time_stamp(id)
    }

    /// 设置参数是否在训练中更新（影响梯度标记的传播）
    pub fn set_parameter_update_required(&mut self, id: NodeId, update_required: bool) -> Result<(), NetworkError> {
        let node = self.get_node_mut(id)?;
        if let NodeType::LearnableParameter(param) = node.raw_node_mut() {
            param.set_update_required(update_required);
            return Ok(());
        }
        Err(NetworkError::InvalidOperation(format!("{node}不是可学习参数")))
    }

    // ========== 节点角色 ==========

    pub fn add_node_to_group(&mut self, role: NodeRole, id: NodeId) -> Result<(), NetworkError> {
        self.get_node(id)?;
        let group = self.group_mut(role);
        if !group.contains(&id) {
            group.push(id);
        }
        Ok(())
    }

    pub fn nodes_in_group(&self, role: NodeRole) -> &[NodeId] {
        match role {
            NodeRole::Feature => &self.feature_nodes,
            NodeRole::Label => &self.label_nodes,
            NodeRole::Criterion => &self.criterion_nodes,
            NodeRole::Output => &self.output_nodes,
            NodeRole::Evaluation => &self.evaluation_nodes,
        }
    }

    fn group_mut(&mut self, role: NodeRole) -> &mut Vec<NodeId> {
        match role {
            NodeRole::Feature => &mut self.feature_nodes,
            NodeRole::Label => &mut self.label_nodes,
            NodeRole::Criterion => &mut self.criterion_nodes,
            NodeRole::Output => &mut self.output_nodes,
            NodeRole::Evaluation => &mut self.evaluation_nodes,
        }
    }

    // ========== 时间戳 ==========

    pub const fn time_stamp_counter(&self) -> u64 {
        self.time_stamp_counter
    }

    /// 把节点的时间戳设为计数器的下一个值
    pub(in crate::nn::graph) fn update_eval_time_stamp(&mut self, id: NodeId) -> Result<(), NetworkError> {
        self.time_stamp_counter += 1;
        let stamp = self.time_stamp_counter;
        self.get_node_mut(id)?.set_eval_time_stamp(stamp);
        Ok(())
    }

    /// 是否有子节点的时间戳不早于本节点（即本节点的值已过期）；叶节点永不过期
    pub(in crate::nn::graph) fn is_func_value_older_than_inputs(&self, id: NodeId) -> Result<bool, NetworkError> {
        let node = self.get_node(id)?;
        for &child in node.children() {
            if self.get_node(child)?.eval_time_stamp() >= node.eval_time_stamp() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// 把子网络中所有节点的时间戳都设为当前计数器的值，使下次`evaluate`重新计算所有非叶节点
    pub fn reset_eval_time_stamp(&mut self, root: NodeId) -> Result<(), NetworkError> {
        let stamp = self.time_stamp_counter;
        for id in self.get_eval_order(root)? {
            self.get_node_mut(id)?.set_eval_time_stamp(stamp);
        }
        Ok(())
    }

    // ========== 缓存 ==========

    /// 清空求值顺序、循环、构建记录等缓存；节点结构或维度改变后必须调用
    pub fn clear_cache(&mut self) {
        self.eval_orders.clear();
        self.built.clear();
        self.recurrent_info.clear();
        self.input_nodes.clear();
        self.learnable_parameters.clear();
        for node in self.nodes.values_mut() {
            node.set_part_of_loop(false);
        }
    }

    // ========== 执行轨迹 ==========

    pub fn execution_trace(&self) -> &[TraceEvent] {
        &self.execution_trace
    }

    pub fn clear_execution_trace(&mut self) {
        self.execution_trace.clear();
    }

    pub(in crate::nn::graph) fn record_trace(&mut self, node: NodeId, phase: Phase, frame: FrameRange) {
        if self.config.trace_execution {
            self.execution_trace.push(TraceEvent { node, phase, frame });
        }
    }

    // ========== 内部工具 ==========

    /// 暂时把节点从表中取出，连同其子节点一并交给`f`处理，结束后（无论成败）放回。
    /// 节点以自身为子节点时，传入的是它调用前的副本。
    pub(in crate::nn::graph) fn with_node_and_inputs<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut NodeHandle, &[&NodeHandle]) -> Result<R, NetworkError>,
    ) -> Result<R, NetworkError> {
        let mut node = self.nodes.remove(&id).ok_or(NetworkError::NodeNotFound(id))?;
        let self_copy = node.children().contains(&id).then(|| node.clone());

        let result = {
            let mut inputs = Vec::with_capacity(node.children().len());
            let mut missing = None;
            for &child in node.children() {
                if child == id {
                    if let Some(copy) = &self_copy {
                        inputs.push(copy);
                    }
                } else if let Some(handle) = self.nodes.get(&child) {
                    inputs.push(handle);
                } else {
                    missing = Some(child);
                }
            }
            match missing {
                Some(child) => Err(NetworkError::NodeNotFound(child)),
                None => f(&mut node, &inputs),
            }
        };

        self.nodes.insert(id, node);
        result
    }

    /// 节点上的错误统一带上节点名与运算名
    pub(in crate::nn::graph) fn node_labels(&self, id: NodeId) -> (String, String) {
        match self.nodes.get(&id) {
            Some(node) => (node.name().to_string(), node.operation_name().to_string()),
            None => (id.to_string(), String::new()),
        }
    }

    pub(in crate::nn::graph) fn is_delay_node(&self, id: NodeId) -> bool {
        self.nodes
            .get(&id)
            .is_some_and(|node| node.raw_node().delay_direction().is_some())
    }
}
