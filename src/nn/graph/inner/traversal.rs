/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : ComputationNetwork 遍历：求值顺序、梯度顺序、强连通分量
 *
 * 求值顺序保证子节点先于父节点（延迟节点到其输入的边除外），
 * 同一个循环的成员在顺序中相邻，平局时按节点 ID 从小到大。
 */

use super::super::error::NetworkError;
use super::ComputationNetwork;
use crate::nn::NodeId;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

impl ComputationNetwork {
    /// 从`root`出发沿子节点边可达的所有节点（含`root`，按 ID 升序）
    pub(in crate::nn::graph) fn reachable_nodes(&self, root: NodeId) -> Result<Vec<NodeId>, NetworkError> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            for &child in self.get_node(id)?.children() {
                if !seen.contains(&child) {
                    stack.push(child);
                }
            }
        }
        Ok(seen.into_iter().collect())
    }

    /// `root`的求值顺序（带缓存）
    pub fn get_eval_order(&mut self, root: NodeId) -> Result<Vec<NodeId>, NetworkError> {
        if let Some(order) = self.eval_orders.get(&root) {
            return Ok(order.clone());
        }
        let order = self.compute_eval_order(root)?;
        self.eval_orders.insert(root, order.clone());
        Ok(order)
    }

    /// `root`的梯度计算顺序，即求值顺序的逆序
    pub fn get_gradient_calc_order(&mut self, root: NodeId) -> Result<Vec<NodeId>, NetworkError> {
        let mut order = self.get_eval_order(root)?;
        order.reverse();
        Ok(order)
    }

    fn compute_eval_order(&self, root: NodeId) -> Result<Vec<NodeId>, NetworkError> {
        let nodes = self.reachable_nodes(root)?;
        let sccs = self.strongly_connected_components(&nodes)?;

        // 1. 缩点：每个强连通分量视为一个整体，子分量先于父分量
        let mut component_of = HashMap::new();
        for (c, scc) in sccs.iter().enumerate() {
            for &id in scc {
                component_of.insert(id, c);
            }
        }
        let mut in_degree = vec![0usize; sccs.len()];
        let mut dependents: Vec<HashSet<usize>> = vec![HashSet::new(); sccs.len()];
        for &id in &nodes {
            let parent_c = component_of[&id];
            for child in self.get_node(id)?.children() {
                let child_c = component_of[child];
                if child_c != parent_c && dependents[child_c].insert(parent_c) {
                    in_degree[parent_c] += 1;
                }
            }
        }

        // 2. 对缩点后的有向无环图做拓扑排序（按分量内最小 ID 打破平局）
        let min_id = |c: usize| sccs[c].iter().min().copied().unwrap_or(NodeId(0));
        let mut ready: BinaryHeap<Reverse<(NodeId, usize)>> = (0..sccs.len())
            .filter(|&c| in_degree[c] == 0)
            .map(|c| Reverse((min_id(c), c)))
            .collect();
        let mut order = Vec::with_capacity(nodes.len());
        while let Some(Reverse((_, c))) = ready.pop() {
            order.extend(self.order_within_component(&sccs[c])?);
            for &parent_c in &dependents[c] {
                in_degree[parent_c] -= 1;
                if in_degree[parent_c] == 0 {
                    ready.push(Reverse((min_id(parent_c), parent_c)));
                }
            }
        }
        Ok(order)
    }

    /// 单个强连通分量内部的顺序：去掉延迟节点的出边后拓扑排序，仍有环则报错
    pub(in crate::nn::graph) fn order_within_component(&self, scc: &[NodeId]) -> Result<Vec<NodeId>, NetworkError> {
        let members: HashSet<NodeId> = scc.iter().copied().collect();
        let mut in_degree: HashMap<NodeId, usize> = scc.iter().map(|&id| (id, 0)).collect();
        let mut dependents: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for &id in scc {
            if self.is_delay_node(id) {
                continue;
            }
            for &child in self.get_node(id)?.children() {
                if members.contains(&child) {
                    dependents.entry(child).or_default().push(id);
                    *in_degree.entry(id).or_default() += 1;
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<NodeId>> = in_degree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();
        let mut order = Vec::with_capacity(scc.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            for &parent in dependents.get(&id).map(Vec::as_slice).unwrap_or_default() {
                if let Some(d) = in_degree.get_mut(&parent) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push(Reverse(parent));
                    }
                }
            }
        }

        if order.len() < scc.len() {
            let stuck = scc
                .iter()
                .copied()
                .filter(|id| !order.contains(id))
                .min()
                .unwrap_or(scc[0]);
            let (node, operation) = self.node_labels(stuck);
            return Err(NetworkError::CycleNotBreakable { node, operation });
        }
        Ok(order)
    }

    /// Tarjan 算法求强连通分量（沿父节点到子节点的边，迭代实现以免递归过深）。
    /// 每个分量内部按 ID 升序。
    pub(in crate::nn::graph) fn strongly_connected_components(
        &self,
        nodes: &[NodeId],
    ) -> Result<Vec<Vec<NodeId>>, NetworkError> {
        let mut index_of: HashMap<NodeId, usize> = HashMap::new();
        let mut low_link: HashMap<NodeId, usize> = HashMap::new();
        let mut on_stack: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut sccs = Vec::new();
        let mut next_index = 0;

        for &start in nodes {
            if index_of.contains_key(&start) {
                continue;
            }
            // 调用栈：(节点, 下一个待访问的子节点序号)
            let mut call_stack = vec![(start, 0usize)];
            index_of.insert(start, next_index);
            low_link.insert(start, next_index);
            next_index += 1;
            stack.push(start);
            on_stack.insert(start);

            while let Some(frame) = call_stack.last_mut() {
                let id = frame.0;
                let children = self.get_node(id)?.children();
                if let Some(&child) = children.get(frame.1) {
                    frame.1 += 1;
                    if !index_of.contains_key(&child) {
                        index_of.insert(child, next_index);
                        low_link.insert(child, next_index);
                        next_index += 1;
                        stack.push(child);
                        on_stack.insert(child);
                        call_stack.push((child, 0));
                    } else if on_stack.contains(&child) {
                        let low = low_link[&id].min(index_of[&child]);
                        low_link.insert(id, low);
                    }
                    continue;
                }

                call_stack.pop();
                if let Some(&(parent, _)) = call_stack.last() {
                    let low = low_link[&parent].min(low_link[&id]);
                    low_link.insert(parent, low);
                }
                if low_link[&id] == index_of[&id] {
                    let mut scc = Vec::new();
                    while let Some(member) = stack.pop() {
                        on_stack.remove(&member);
                        scc.push(member);
                        if member == id {
                            break;
                        }
                    }
                    scc.sort_unstable();
                    sccs.push(scc);
                }
            }
        }
        Ok(sccs)
    }
}
