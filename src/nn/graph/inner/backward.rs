/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : ComputationNetwork 反向求梯度
 *
 * 按梯度顺序（求值顺序的逆序）把每个节点的梯度累加到其子节点上。
 * 循环整体处理：帧按步进方向的反方向遍历，每帧内成员按前向顺序的逆序执行。
 */

use super::super::error::NetworkError;
use super::super::types::{GradientOptions, Phase};
use super::ComputationNetwork;
use crate::nn::NodeId;
use crate::nn::layout::{FrameRange, FrameRangeIteration};
use crate::nn::nodes::raw_node::{ChildGradient, TraitNode};

impl ComputationNetwork {
    /// 以`root`为根反向传播梯度（会先调用`evaluate`）
    pub fn compute_gradient(&mut self, root: NodeId, options: &GradientOptions) -> Result<(), NetworkError> {
        // 1. 前向
        self.evaluate(root)?;

        // 2. 梯度与值同形，按需清零
        let order = self.get_gradient_calc_order(root)?;
        for &id in &order {
            let node = self.get_node_mut(id)?;
            node.ensure_grad_shape();
            if options.clear_gradients {
                node.grad_mut().fill(0.0);
            }
        }

        // 3. 根节点的初始梯度
        self.init_root_gradient(root, options)?;

        // 4. 逐节点反传
        for info in &mut self.recurrent_info {
            info.completed_gradient = false;
        }
        for &id in &order {
            match self.find_in_recurrent_loops(id) {
                Some(loop_index) => {
                    if !self.recurrent_info[loop_index].completed_gradient {
                        self.compute_loop_gradient(loop_index)?;
                    }
                }
                None => self.compute_whole_batch_gradient(id)?,
            }
        }

        // 5. 按需重置时间戳
        if options.reset_timestamps {
            self.reset_eval_time_stamp(root)?;
        }
        Ok(())
    }

    fn init_root_gradient(&mut self, root: NodeId, options: &GradientOptions) -> Result<(), NetworkError> {
        if options.reset_root_to_one && options.initial_root_gradient.is_some() {
            log::warn!(
                "同时指定了把根节点{}的梯度置1与初始梯度，以初始梯度为准",
                self.get_node_name(root)?
            );
        }

        let node = self.get_node_mut(root)?;
        match &options.initial_root_gradient {
            Some(initial) => {
                if initial.dims() != node.dims() {
                    return Err(NetworkError::DimensionMismatch {
                        node: node.name().to_string(),
                        operation: node.operation_name().to_string(),
                        message: format!(
                            "初始梯度为{:?}，而节点值为{:?}",
                            initial.dims(),
                            node.dims()
                        ),
                    });
                }
                node.grad_mut().set_value(initial);
            }
            None if options.reset_root_to_one => {
                // 只有标量根节点的梯度可以置为1
                if node.dims() != (1, 1) {
                    return Err(NetworkError::DimensionMismatch {
                        node: node.name().to_string(),
                        operation: node.operation_name().to_string(),
                        message: format!("根节点梯度只能对[1, 1]的值置1，而节点值为{:?}", node.dims()),
                    });
                }
                node.grad_mut().fill(1.0);
            }
            None => {}
        }
        Ok(())
    }

    /// 非循环节点：对整个小批量一次性反传
    fn compute_whole_batch_gradient(&mut self, id: NodeId) -> Result<(), NetworkError> {
        let node = self.get_node_mut(id)?;
        if node.is_leaf() {
            return Ok(());
        }
        if node.is_part_of_loop() {
            let (name, operation) = self.node_labels(id);
            return Err(NetworkError::WholeBatchOnLoopNode {
                node: name,
                operation,
            });
        }
        node.raw_node_mut().on_compute_gradient_begin_iteration();
        node.mask_gap_columns(FrameRange::AllFrames, true);
        self.compute_gradient_for_children(id, FrameRange::AllFrames)?;
        self.get_node_mut(id)?
            .raw_node_mut()
            .on_compute_gradient_end_iteration();
        Ok(())
    }

    /// 循环：逆着步进方向逐帧反传，每帧内成员逆序
    fn compute_loop_gradient(&mut self, loop_index: usize) -> Result<(), NetworkError> {
        let info = &self.recurrent_info[loop_index];
        let members = info.recurrent_nodes_for_forward.clone();
        let direction = info.stepping_direction;

        for &id in &members {
            self.get_node_mut(id)?
                .raw_node_mut()
                .on_compute_gradient_begin_iteration();
        }

        let layout = self.loop_layout(&members)?;
        for fr in FrameRangeIteration::new(&layout, direction).iter().rev() {
            for &id in members.iter().rev() {
                self.verify_num_parallel_sequences(id)?;
                self.get_node_mut(id)?.mask_gap_columns(fr, true);
                self.compute_gradient_for_children(id, fr)?;
            }
        }

        for &id in &members {
            self.get_node_mut(id)?
                .raw_node_mut()
                .on_compute_gradient_end_iteration();
        }
        self.recurrent_info[loop_index].completed_gradient = true;
        Ok(())
    }

    /// 节点布局的并行序列数须与网络布局一致
    fn verify_num_parallel_sequences(&self, id: NodeId) -> Result<(), NetworkError> {
        let expected = self.mb_layout.borrow().num_parallel_sequences();
        let actual = self
            .get_node(id)?
            .mb_layout()
            .map_or(expected, |l| l.borrow().num_parallel_sequences());
        if actual != expected {
            let (node, operation) = self.node_labels(id);
            return Err(NetworkError::ParallelSequenceMismatch {
                node,
                operation,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// 把节点在`fr`上的梯度传给所有需要梯度的子节点
    fn compute_gradient_for_children(&mut self, id: NodeId, fr: FrameRange) -> Result<(), NetworkError> {
        let contributions = self.with_node_and_inputs(id, |node, inputs| {
            let mut contributions = Vec::new();
            for (index, input) in inputs.iter().enumerate() {
                if !input.needs_gradient() {
                    continue;
                }
                let contribution =
                    node.with_view(|view| node.raw_node().compute_gradient(index, fr, view, inputs))?;
                if let Some(contribution) = contribution {
                    contributions.push((node.children()[contribution.index], contribution));
                }
            }
            node.record_gradient_computation();
            Ok(contributions)
        })?;

        for (child, contribution) in contributions {
            self.accumulate_gradient(id, child, contribution)?;
        }
        self.record_trace(id, Phase::Gradient, fr);
        Ok(())
    }

    fn accumulate_gradient(
        &mut self,
        parent: NodeId,
        child: NodeId,
        contribution: ChildGradient,
    ) -> Result<(), NetworkError> {
        let ChildGradient { columns, value, .. } = contribution;
        let node = self.get_node_mut(child)?;
        node.ensure_grad_shape();
        let fits = value.rows() == node.rows()
            && value.cols() == columns.len()
            && columns.end <= node.cols();
        if !fits {
            let (name, operation) = self.node_labels(parent);
            let child_name = self.get_node_name(child)?;
            return Err(NetworkError::DimensionMismatch {
                node: name,
                operation,
                message: format!(
                    "传给子节点{}的梯度为{:?}，无法累加到其第{:?}列",
                    child_name,
                    value.dims(),
                    columns
                ),
            });
        }
        node.grad_mut().add_to_columns(columns, &value);
        Ok(())
    }
}
