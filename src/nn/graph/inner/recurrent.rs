/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : ComputationNetwork 循环识别
 *
 * 含延迟边的强连通分量（大小大于1，或节点以自身为输入）即为一个循环。
 * 由`PastValue`闭合的循环正向逐帧执行，由`FutureValue`闭合的反向执行，
 * 两者混用的循环无法逐帧求值。
 */

use super::super::error::NetworkError;
use super::super::types::RecurrentInfo;
use super::ComputationNetwork;
use crate::nn::NodeId;
use crate::nn::layout::SteppingDirection;
use crate::nn::nodes::raw_node::TraitNode;

impl ComputationNetwork {
    /// 识别`root`子网络中的所有循环，追加到网络的循环列表（已存在的循环不重复添加）
    pub fn form_recurrent_loops(&mut self, root: NodeId) -> Result<(), NetworkError> {
        // 求值顺序同时保证了去掉延迟边后无环
        let order = self.get_eval_order(root)?;
        let sccs = self.strongly_connected_components(&order)?;

        let mut found = 0;
        for scc in sccs {
            let is_self_loop = scc.len() == 1 && self.get_node(scc[0])?.children().contains(&scc[0]);
            if scc.len() < 2 && !is_self_loop {
                continue;
            }
            found += 1;
            if self.recurrent_info.iter().any(|r| r.recurrent_nodes == scc) {
                continue;
            }

            let stepping_direction = self.loop_direction(&scc)?;
            let recurrent_nodes_for_forward: Vec<NodeId> = order
                .iter()
                .copied()
                .filter(|id| scc.binary_search(id).is_ok())
                .collect();
            for &id in &scc {
                self.get_node_mut(id)?.set_part_of_loop(true);
            }
            log::debug!(
                "识别出循环（{}个节点，方向{}）：{}",
                scc.len(),
                stepping_direction.sign(),
                self.names_of(&recurrent_nodes_for_forward).join(" -> ")
            );
            self.recurrent_info.push(RecurrentInfo {
                recurrent_nodes: scc,
                recurrent_nodes_for_forward,
                stepping_direction,
                completed_evaluate: false,
                completed_gradient: false,
            });
        }

        log::info!(
            "网络{}以{}为根的子网络中共有{}个循环",
            self.name(),
            self.get_node_name(root)?,
            found
        );
        Ok(())
    }

    /// 由循环内的延迟节点决定步进方向
    fn loop_direction(&self, scc: &[NodeId]) -> Result<SteppingDirection, NetworkError> {
        let mut direction: Option<SteppingDirection> = None;
        for &id in scc {
            let Some(d) = self.get_node(id)?.raw_node().delay_direction() else {
                continue;
            };
            match direction {
                Some(existing) if existing != d => {
                    let (node, operation) = self.node_labels(id);
                    return Err(NetworkError::MixedRecurrenceDirection { node, operation });
                }
                _ => direction = Some(d),
            }
        }
        direction.ok_or_else(|| {
            let (node, operation) = self.node_labels(scc[0]);
            NetworkError::CycleNotBreakable { node, operation }
        })
    }

    /// 查找包含`id`的循环的下标
    pub(in crate::nn::graph) fn find_in_recurrent_loops(&self, id: NodeId) -> Option<usize> {
        self.recurrent_info.iter().position(|r| r.contains(id))
    }

    /// 已识别出的所有循环
    pub fn recurrent_loops(&self) -> &[RecurrentInfo] {
        &self.recurrent_info
    }

    /// 包含`id`的循环（若有）
    pub fn find_recurrent_loop(&self, id: NodeId) -> Option<&RecurrentInfo> {
        self.find_in_recurrent_loops(id).map(|i| &self.recurrent_info[i])
    }

    /// 循环是否需要重新计算：任一非延迟成员的值已过期。
    /// 延迟节点的输入就在循环内且总是更新，不能参与判断。
    pub(in crate::nn::graph) fn is_loop_stale(&self, loop_index: usize) -> Result<bool, NetworkError> {
        for &id in &self.recurrent_info[loop_index].recurrent_nodes_for_forward {
            if !self.is_delay_node(id) && self.is_func_value_older_than_inputs(id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub(in crate::nn::graph) fn names_of(&self, ids: &[NodeId]) -> Vec<String> {
        ids.iter().map(|&id| self.node_labels(id).0).collect()
    }
}
