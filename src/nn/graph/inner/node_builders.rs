/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : ComputationNetwork 节点构建方法（new_*_node）
 *
 * 运算节点创建时维度为0，由校验根据子节点推断；
 * 延迟节点通常先于其输入创建，再用`set_node_inputs`闭合循环。
 */

use super::super::error::NetworkError;
use super::ComputationNetwork;
use crate::nn::NodeId;
use crate::nn::layout::SteppingDirection;
use crate::nn::nodes::raw_node::{
    DelayedValue, ElementTimes, InputValue, LearnableParameter, Minus, NodeType, Plus, Sigmoid,
    SquareError, SumElements, Tanh, Times, TraitNode,
};
use crate::nn::nodes::{Init, NodeHandle};

impl ComputationNetwork {
    /// 添加节点到网络
    fn add_node_to_list<T: Into<NodeType>>(
        &mut self,
        raw_node: T,
        dims: (usize, usize),
        name: Option<&str>,
        children: &[NodeId],
    ) -> Result<NodeId, NetworkError> {
        for &child in children {
            self.get_node(child)?;
        }
        let raw_node: NodeType = raw_node.into();
        let node_name = self.generate_valid_new_node_name(name.unwrap_or(""), raw_node.operation_name())?;
        let id = self.generate_valid_node_id();

        let mut handle = NodeHandle::new(id, &node_name, raw_node, dims.0, dims.1);
        handle.set_children(children.to_vec());
        self.nodes.insert(id, handle);
        Ok(id)
    }

    fn generate_valid_node_id(&mut self) -> NodeId {
        // 先递增再返回，所以第一个节点 ID 是 1
        self.next_id += 1;
        NodeId(self.next_id)
    }

    fn check_duplicate_node_name(&self, name: &str) -> Result<(), NetworkError> {
        if self.nodes.values().any(|node| node.name() == name) {
            return Err(NetworkError::InvalidOperation(format!(
                "节点{}在网络{}中重复",
                name,
                self.name()
            )));
        }
        Ok(())
    }

    fn generate_valid_new_node_name(&self, base_name: &str, operation: &str) -> Result<String, NetworkError> {
        if !base_name.is_empty() {
            self.check_duplicate_node_name(base_name)?;
            return Ok(base_name.to_string());
        }

        let mut counter = 1;
        loop {
            let name = format!("{operation}_{counter}");
            if self.check_duplicate_node_name(&name).is_ok() {
                return Ok(name);
            }
            counter += 1;
        }
    }

    // ========== 叶节点 ==========

    /// 创建输入节点，列数在校验时由小批量布局决定
    pub fn new_input_node(&mut self, rows: usize, name: Option<&str>) -> Result<NodeId, NetworkError> {
        self.add_node_to_list(InputValue::new(rows), (rows, 1), name, &[])
    }

    /// 创建可学习参数。`cols`为0时表示列数待由父节点（如`Times`）推断
    pub fn new_parameter_node(
        &mut self,
        rows: usize,
        cols: usize,
        init: Init,
        name: Option<&str>,
    ) -> Result<NodeId, NetworkError> {
        let initial = if rows * cols > 0 {
            Some(init.generate(rows, cols, &mut self.rng).ok_or_else(|| {
                NetworkError::InvalidOperation(format!(
                    "参数初始值的个数与形状[{rows}, {cols}]不符"
                ))
            })?)
        } else {
            None
        };

        let id = self.add_node_to_list(LearnableParameter::new(init), (rows, cols), name, &[])?;
        if let Some(value) = initial {
            self.get_node_mut(id)?.set_value(&value);
        }
        Ok(id)
    }

    // ========== 运算节点 ==========

    /// 创建矩阵乘法节点`W · x`
    pub fn new_times_node(&mut self, w: NodeId, x: NodeId, name: Option<&str>) -> Result<NodeId, NetworkError> {
        self.add_node_to_list(Times, (0, 0), name, &[w, x])
    }

    pub fn new_plus_node(&mut self, a: NodeId, b: NodeId, name: Option<&str>) -> Result<NodeId, NetworkError> {
        self.add_node_to_list(Plus, (0, 0), name, &[a, b])
    }

    pub fn new_minus_node(&mut self, a: NodeId, b: NodeId, name: Option<&str>) -> Result<NodeId, NetworkError> {
        self.add_node_to_list(Minus, (0, 0), name, &[a, b])
    }

    /// 创建逐元素乘法节点
    pub fn new_element_times_node(
        &mut self,
        a: NodeId,
        b: NodeId,
        name: Option<&str>,
    ) -> Result<NodeId, NetworkError> {
        self.add_node_to_list(ElementTimes, (0, 0), name, &[a, b])
    }

    pub fn new_sigmoid_node(&mut self, input: NodeId, name: Option<&str>) -> Result<NodeId, NetworkError> {
        self.add_node_to_list(Sigmoid, (0, 0), name, &[input])
    }

    pub fn new_tanh_node(&mut self, input: NodeId, name: Option<&str>) -> Result<NodeId, NetworkError> {
        self.add_node_to_list(Tanh, (0, 0), name, &[input])
    }

    /// 创建求和节点（输出`1×1`标量）
    pub fn new_sum_elements_node(&mut self, input: NodeId, name: Option<&str>) -> Result<NodeId, NetworkError> {
        self.add_node_to_list(SumElements, (0, 0), name, &[input])
    }

    /// 创建平方误差准则节点`Σ(a - b)²`（输出`1×1`标量）
    pub fn new_square_error_node(
        &mut self,
        a: NodeId,
        b: NodeId,
        name: Option<&str>,
    ) -> Result<NodeId, NetworkError> {
        self.add_node_to_list(SquareError, (0, 0), name, &[a, b])
    }

    // ========== 延迟节点 ==========

    /// 创建`PastValue(time_step)`节点，尚无输入；之后用`set_node_inputs`连接。
    /// 初始值取`config.delay_initial_value`
    pub fn new_past_value_node(
        &mut self,
        rows: usize,
        time_step: usize,
        name: Option<&str>,
    ) -> Result<NodeId, NetworkError> {
        self.new_delay_node(SteppingDirection::Forward, rows, time_step, name)
    }

    /// 创建`FutureValue(time_step)`节点，用法同`new_past_value_node`
    pub fn new_future_value_node(
        &mut self,
        rows: usize,
        time_step: usize,
        name: Option<&str>,
    ) -> Result<NodeId, NetworkError> {
        self.new_delay_node(SteppingDirection::Backward, rows, time_step, name)
    }

    fn new_delay_node(
        &mut self,
        direction: SteppingDirection,
        rows: usize,
        time_step: usize,
        name: Option<&str>,
    ) -> Result<NodeId, NetworkError> {
        if time_step == 0 {
            return Err(NetworkError::InvalidOperation(
                "延迟节点的时间步数必须大于0".to_string(),
            ));
        }
        let raw = DelayedValue::new(direction, rows, time_step, self.config.delay_initial_value);
        self.add_node_to_list(raw, (rows, 0), name, &[])
    }

    // ========== 结构修改 ==========

    /// 重新设置节点的输入（子节点）。网络结构因此改变，所有缓存随之清空
    pub fn set_node_inputs(&mut self, id: NodeId, inputs: &[NodeId]) -> Result<(), NetworkError> {
        for &child in inputs {
            self.get_node(child)?;
        }
        self.get_node_mut(id)?.set_children(inputs.to_vec());
        self.clear_cache();
        Ok(())
    }

    /// 丢弃所有延迟节点跨小批量保存的状态（如新的一轮开始时）
    pub fn reset_delay_states(&mut self) {
        for node in self.nodes.values_mut() {
            if let NodeType::Delay(delay) = node.raw_node_mut() {
                delay.reset_state();
            }
        }
    }
}
