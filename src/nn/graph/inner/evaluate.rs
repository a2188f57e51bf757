/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : ComputationNetwork 前向求值
 *
 * 默认情况下每个节点对整个小批量一次算完（各帧互不依赖）；
 * 循环则像一个嵌套的小网络，按步进方向逐帧地把所有成员各算一遍。
 */

use super::super::error::NetworkError;
use super::super::types::Phase;
use super::ComputationNetwork;
use crate::nn::NodeId;
use crate::nn::layout::{FrameRange, FrameRangeIteration, MbLayout};
use crate::nn::nodes::raw_node::TraitNode;

impl ComputationNetwork {
    /// 按求值顺序计算`root`子网络中所有过期的节点。
    /// 调用前必须对`root`调用过`build_and_validate_sub_network`。
    pub fn evaluate(&mut self, root: NodeId) -> Result<(), NetworkError> {
        if !self.built_and_validated_sub_network(root) {
            let (node, operation) = self.node_labels(root);
            return Err(NetworkError::NotBuilt { node, operation });
        }

        let order = self.get_eval_order(root)?;
        self.verify_input_sizes(&order)?;
        for info in &mut self.recurrent_info {
            info.completed_evaluate = false;
        }

        for &id in &order {
            match self.find_in_recurrent_loops(id) {
                Some(loop_index)
                    if !self.recurrent_info[loop_index].completed_evaluate
                        && self.is_loop_stale(loop_index)? =>
                {
                    self.evaluate_loop(loop_index)?;
                }
                None if self.is_func_value_older_than_inputs(id)? => {
                    self.evaluate_whole_batch(id)?;
                }
                // 已是最新的节点只调用结束钩子，以便做NaN检查
                _ => self.on_evaluate_end_iteration(id)?,
            }
        }
        Ok(())
    }

    /// 读取器写入的输入值必须与当前小批量布局的列数一致
    fn verify_input_sizes(&self, order: &[NodeId]) -> Result<(), NetworkError> {
        for &id in order {
            let node = self.get_node(id)?;
            if !node.raw_node().is_input() {
                continue;
            }
            if let Some(layout) = node.mb_layout() {
                let expected = layout.borrow().num_cols();
                if node.cols() != expected {
                    let (name, operation) = self.node_labels(id);
                    return Err(NetworkError::DimensionMismatch {
                        node: name,
                        operation,
                        message: format!(
                            "输入有{}列，而小批量布局为{}列",
                            node.cols(),
                            expected
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// 非循环节点：对整个小批量计算一次
    fn evaluate_whole_batch(&mut self, id: NodeId) -> Result<(), NetworkError> {
        let node = self.get_node_mut(id)?;
        node.update_function_mb_size();
        let needs_revalidate = !node.is_leaf() && !node.raw_node().requires_pre_compute();
        if needs_revalidate {
            self.revalidate_node(id)?;
        }
        self.get_node_mut(id)?.raw_node_mut().on_evaluate_begin_iteration();
        self.evaluate_node_frame(id, FrameRange::AllFrames)?;
        self.on_evaluate_end_iteration(id)?;
        self.update_eval_time_stamp(id)
    }

    /// 循环：所有成员共享同一布局，逐帧依次计算每个成员
    fn evaluate_loop(&mut self, loop_index: usize) -> Result<(), NetworkError> {
        let info = &self.recurrent_info[loop_index];
        let members = info.recurrent_nodes_for_forward.clone();
        let direction = info.stepping_direction;

        let layout = self.loop_layout(&members)?;
        for &id in &members {
            let node = self.get_node_mut(id)?;
            node.update_function_mb_size();
            node.raw_node_mut().on_evaluate_begin_iteration();
        }
        for &id in &members {
            self.revalidate_node(id)?;
        }

        log::trace!(
            "逐帧计算循环（{}个节点，{}帧，方向{}）",
            members.len(),
            layout.num_time_steps(),
            direction.sign()
        );
        for fr in FrameRangeIteration::new(&layout, direction) {
            for &id in &members {
                self.evaluate_node_frame(id, fr)?;
                self.update_eval_time_stamp(id)?;
            }
        }

        for &id in &members {
            self.on_evaluate_end_iteration(id)?;
        }
        self.recurrent_info[loop_index].completed_evaluate = true;
        Ok(())
    }

    /// 检查循环成员共享同一布局，并返回该布局的快照
    pub(in crate::nn::graph) fn loop_layout(&self, members: &[NodeId]) -> Result<MbLayout, NetworkError> {
        let first = self.get_node(members[0])?;
        let reference = first.mb_layout().cloned();
        for &id in members {
            let node = self.get_node(id)?;
            if reference.is_none() || !node.shares_layout_with(reference.as_ref()) {
                let (name, operation) = self.node_labels(id);
                return Err(NetworkError::LoopLayoutMismatch {
                    node: name,
                    operation,
                    reference: first.name().to_string(),
                });
            }
        }
        Ok(reference.map(|layout| layout.borrow().clone()).unwrap_or_default())
    }

    /// 计算节点在`fr`上的值并写回对应的列
    fn evaluate_node_frame(&mut self, id: NodeId, fr: FrameRange) -> Result<(), NetworkError> {
        self.with_node_and_inputs(id, |node, inputs| {
            let block = node.with_view(|view| node.raw_node().evaluate(fr, view, inputs))?;
            let columns = {
                let layout = node.mb_layout().map(|l| l.borrow());
                fr.column_range(layout.as_deref(), node.cols())
            };
            if block.dims() != (node.rows(), columns.len()) {
                return Err(NetworkError::DimensionMismatch {
                    node: node.name().to_string(),
                    operation: node.operation_name().to_string(),
                    message: format!(
                        "计算结果为{:?}，而目标列区间需要[{}, {}]",
                        block.dims(),
                        node.rows(),
                        columns.len()
                    ),
                });
            }
            node.value_mut().set_columns(columns, &block);
            node.mask_gap_columns(fr, false);
            node.record_evaluation();
            log::trace!("前向：{} {:?}", node.name(), fr);
            Ok(())
        })?;
        self.record_trace(id, Phase::Evaluate, fr);
        Ok(())
    }

    /// 一轮前向结束的钩子；开启NaN检查时在此检查输出
    fn on_evaluate_end_iteration(&mut self, id: NodeId) -> Result<(), NetworkError> {
        let check_nan = self.config.check_nan;
        self.with_node_and_inputs(id, |node, inputs| {
            node.raw_node_mut().on_evaluate_end_iteration(inputs);
            if check_nan && node.value().has_nan() {
                return Err(NetworkError::NanDetected {
                    node: node.name().to_string(),
                    operation: node.operation_name().to_string(),
                });
            }
            Ok(())
        })
    }
}
