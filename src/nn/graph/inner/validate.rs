/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : ComputationNetwork 校验：多轮推断形状与布局、最终一致性检查、构建缓存
 *
 * 循环中的节点往往要先给出临时的维度，其（经延迟边闭合的）输入才能被推断，
 * 因此校验分两个阶段：先反复做非最终校验直到不再有变化，再做一轮最终校验，
 * 最终校验中任何节点的状态都不允许再改变。
 */

use super::super::error::NetworkError;
use super::ComputationNetwork;
use crate::nn::NodeId;
use crate::nn::display::format_dims;
use crate::nn::layout::MbLayoutPtr;
use crate::nn::nodes::ImageLayout;
use crate::nn::nodes::raw_node::{NodeType, TraitNode, ValidationContext, ValidationOutcome};
use crate::tensor::Tensor;
use std::collections::BTreeSet;
use std::rc::Rc;

/// 校验前后需要保持不变的节点状态
#[derive(Debug)]
struct NodeSnapshot {
    mb_layout: Option<MbLayoutPtr>,
    dims: (usize, usize),
    child_dims: Vec<(usize, usize)>,
    image_layout: ImageLayout,
    needs_gradient: bool,
}

impl NodeSnapshot {
    /// 与`other`相比发生变化的项（无变化时为None）
    fn difference(&self, other: &Self) -> Option<&'static str> {
        let same_layout = match (&self.mb_layout, &other.mb_layout) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !same_layout {
            Some("小批量布局")
        } else if self.dims != other.dims {
            Some("维度")
        } else if self.child_dims != other.child_dims {
            Some("子节点维度")
        } else if self.image_layout != other.image_layout {
            Some("图像布局")
        } else if self.needs_gradient != other.needs_gradient {
            Some("梯度标记")
        } else {
            None
        }
    }
}

impl ComputationNetwork {
    // ========== 构建缓存 ==========

    /// 为在`root`上求值做准备：识别循环、收集输入与参数、校验子网络。
    /// 每个根节点只做一次，直到`clear_cache`。
    pub fn build_and_validate_sub_network(&mut self, root: NodeId) -> Result<(), NetworkError> {
        if self.built.contains(&root) {
            return Ok(());
        }
        self.form_recurrent_loops(root)?;
        self.collect_input_and_learnable_parameters(root)?;
        self.validate_sub_network(root)?;
        self.built.insert(root);
        Ok(())
    }

    pub fn built_and_validated_sub_network(&self, root: NodeId) -> bool {
        self.built.contains(&root)
    }

    /// 收集`root`子网络中的输入节点与可学习参数（按求值顺序，带缓存）
    pub fn collect_input_and_learnable_parameters(&mut self, root: NodeId) -> Result<(), NetworkError> {
        let order = self.get_eval_order(root)?;
        let mut inputs = Vec::new();
        let mut parameters = Vec::new();
        for &id in &order {
            let raw_node = self.get_node(id)?.raw_node();
            if raw_node.is_input() {
                inputs.push(id);
            } else if matches!(raw_node, NodeType::LearnableParameter(_)) {
                parameters.push(id);
            }
        }
        self.input_nodes.insert(root, inputs);
        self.learnable_parameters.insert(root, parameters);
        Ok(())
    }

    pub fn input_nodes(&mut self, root: NodeId) -> Result<Vec<NodeId>, NetworkError> {
        if !self.input_nodes.contains_key(&root) {
            self.collect_input_and_learnable_parameters(root)?;
        }
        Ok(self.input_nodes.get(&root).cloned().unwrap_or_default())
    }

    pub fn learnable_parameters(&mut self, root: NodeId) -> Result<Vec<NodeId>, NetworkError> {
        if !self.learnable_parameters.contains_key(&root) {
            self.collect_input_and_learnable_parameters(root)?;
        }
        Ok(self.learnable_parameters.get(&root).cloned().unwrap_or_default())
    }

    // ========== 子网络校验 ==========

    /// 推断并检查`root`子网络中每个节点的形状与布局
    pub fn validate_sub_network(&mut self, root: NodeId) -> Result<(), NetworkError> {
        // 1. 输入节点挂接网络布局；尚未读入小批量时以第一个输入的列数作占位
        for id in self.input_nodes(root)? {
            let layout = Rc::clone(&self.mb_layout);
            let node = self.get_node_mut(id)?;
            node.set_mb_layout(Some(Rc::clone(&layout)));
            if layout.borrow().num_cols() == 0 {
                let cols = node.cols();
                layout.borrow_mut().init(1, cols, false);
            }
        }

        // 2. 重置访问标记，梯度标记从参数开始向上传播
        let order = self.get_eval_order(root)?;
        for &id in &order {
            let node = self.get_node_mut(id)?;
            let needs_gradient = node.raw_node().is_parameter_update_required();
            node.set_visited(false);
            node.set_needs_gradient(needs_gradient);
        }

        // 3. 非最终校验，直到没有节点需要重做
        let root_name = self.get_node_name(root)?.to_string();
        let max_passes = order.len() + 1;
        let mut todo = order.len();
        let mut pass = 0;
        while todo > 0 {
            if pass >= max_passes {
                return Err(NetworkError::ValidationStuck {
                    root: root_name,
                    passes: pass,
                    remaining: todo,
                });
            }
            pass += 1;
            log::info!("校验以{root_name}为根的子网络：第{pass}轮，待处理{todo}个节点");
            todo = self.validate_nodes(&order, false)?;
        }

        // 4. 最终校验
        log::info!("校验以{root_name}为根的子网络：最终校验");
        let remaining = self.validate_nodes(&order, true)?;
        if remaining != 0 {
            return Err(NetworkError::ValidationStuck {
                root: root_name,
                passes: pass + 1,
                remaining,
            });
        }

        // 5. 节点输出不允许没有元素
        for &id in &order {
            let node = self.get_node(id)?;
            let (rows, cols) = node.dims();
            if rows == 0 && (node.has_mb_layout() || cols == 0) {
                let (node, operation) = self.node_labels(id);
                return Err(NetworkError::ZeroDimension {
                    node,
                    operation,
                    rows,
                    cols,
                });
            }
        }

        let non_default = order
            .iter()
            .filter(|&&id| {
                self.nodes
                    .get(&id)
                    .is_some_and(|node| !node.shares_layout_with(Some(&self.mb_layout)))
            })
            .count();
        if non_default > 0 {
            log::info!(
                "{}个节点中有{}个未使用输入数据的小批量布局",
                order.len(),
                non_default
            );
        }
        Ok(())
    }

    /// 按顺序校验一轮，返回仍需重做的节点数
    pub(in crate::nn) fn validate_nodes(&mut self, order: &[NodeId], is_final: bool) -> Result<usize, NetworkError> {
        let mut todo = 0;
        for &id in order {
            let node = self.get_node(id)?;
            let is_leaf = node.is_leaf();
            let mut has_visited_child = false;
            let mut all_children_visited = true;
            for &child in node.children() {
                let visited = self.get_node(child)?.is_visited();
                has_visited_child |= visited;
                all_children_visited &= visited;
            }
            if !(has_visited_child || is_leaf) {
                todo += 1;
                continue;
            }

            let before = self.snapshot(id)?;
            let outcome = self.run_validate(id, is_final)?;
            self.apply_validation(id, outcome)?;
            log::debug!("{}", self.validation_line(id)?);

            let children_need_gradient = {
                let node = self.get_node(id)?;
                let mut any = false;
                for &child in node.children() {
                    any |= self.get_node(child)?.needs_gradient();
                }
                any
            };
            let node = self.get_node_mut(id)?;
            node.set_visited(true);
            if children_need_gradient {
                node.set_needs_gradient(true);
            }

            let after = self.snapshot(id)?;
            let change = before.difference(&after);
            if is_final {
                if let Some(what) = change {
                    let (node, operation) = self.node_labels(id);
                    return Err(NetworkError::NonStableValidation {
                        node,
                        operation,
                        what: what.to_string(),
                    });
                }
                if !all_children_visited {
                    let (node, operation) = self.node_labels(id);
                    return Err(NetworkError::IncompleteValidation { node, operation });
                }
            }
            let valid = (all_children_visited && change.is_none()) || is_leaf;
            if !valid {
                todo += 1;
            }
        }
        Ok(todo)
    }

    fn snapshot(&self, id: NodeId) -> Result<NodeSnapshot, NetworkError> {
        let node = self.get_node(id)?;
        let mut child_dims = Vec::with_capacity(node.children().len());
        for &child in node.children() {
            child_dims.push(self.get_node(child)?.dims());
        }
        Ok(NodeSnapshot {
            mb_layout: node.mb_layout().cloned(),
            dims: node.dims(),
            child_dims,
            image_layout: node.image_layout(),
            needs_gradient: node.needs_gradient(),
        })
    }

    /// 调用节点自身的校验
    fn run_validate(&mut self, id: NodeId, is_final: bool) -> Result<ValidationOutcome, NetworkError> {
        let network_layout = Rc::clone(&self.mb_layout);
        self.with_node_and_inputs(id, |node, inputs| {
            if let Some(expected) = node.raw_node().num_inputs() {
                if expected != inputs.len() {
                    return Err(NetworkError::InvalidOperation(format!(
                        "{node}需要{expected}个输入，实际为{}个",
                        inputs.len()
                    )));
                }
            }
            let ctx = ValidationContext {
                name: node.name(),
                network_layout: &network_layout,
                own_layout: node.mb_layout(),
                own_dims: node.dims(),
                is_final,
            };
            node.raw_node().validate(&ctx, inputs)
        })
    }

    /// 把校验结果写回节点：布局、形状、图像布局，以及推断出的子节点维度
    fn apply_validation(&mut self, id: NodeId, outcome: ValidationOutcome) -> Result<(), NetworkError> {
        let children = self.get_node(id)?.children().to_vec();
        for resize in &outcome.child_resizes {
            let child_id = children[resize.index];
            let child = self
                .nodes
                .get_mut(&child_id)
                .ok_or(NetworkError::NodeNotFound(child_id))?;
            if child.dims() == (resize.rows, resize.cols) {
                continue;
            }
            let value = child
                .raw_node()
                .initial_value(resize.rows, resize.cols, &mut self.rng)
                .unwrap_or_else(|| Tensor::zeros(&[resize.rows, resize.cols]));
            child.set_value(&value);
            child.set_image_layout(ImageLayout::vector(resize.rows));
            log::debug!(
                "{}的维度被推断为[{}, {}]",
                child.name(),
                resize.rows,
                resize.cols
            );
        }

        let node = self.get_node_mut(id)?;
        node.set_mb_layout(outcome.mb_layout);
        node.value_mut().resize(outcome.rows, outcome.cols);
        node.set_image_layout(outcome.image_layout);
        Ok(())
    }

    /// 求值时按当前小批量重新做一次最终校验（调整列数），不做稳定性检查
    pub(in crate::nn::graph) fn revalidate_node(&mut self, id: NodeId) -> Result<(), NetworkError> {
        let outcome = self.run_validate(id, true)?;
        self.apply_validation(id, outcome)
    }

    /// 校验日志行：`<Name> = <Op>(<child dims>) -> [<rows>, MBSize <cols>]`
    fn validation_line(&self, id: NodeId) -> Result<String, NetworkError> {
        let node = self.get_node(id)?;
        let mut child_dims = Vec::with_capacity(node.children().len());
        for &child in node.children() {
            let child = self.get_node(child)?;
            child_dims.push(format_dims(child.rows(), child.cols(), child.has_mb_layout()));
        }
        Ok(format!(
            "{} = {}({}) -> {}",
            node.name(),
            node.operation_name(),
            child_dims.join(", "),
            format_dims(node.rows(), node.cols(), node.has_mb_layout())
        ))
    }

    // ========== 整网校验 ==========

    /// 校验所有准则、输出与评估节点（各自独立），并为它们的并集分配求值矩阵。
    /// `allow_fragment`为true时允许网络不完整，且不识别循环。
    pub fn validate_network(&mut self, allow_fragment: bool, allow_no_criterion: bool) -> Result<(), NetworkError> {
        if self.feature_nodes.is_empty() && !allow_fragment {
            return Err(NetworkError::MissingFeatures);
        }

        let criteria = self.criterion_nodes.clone();
        if criteria.is_empty() && !allow_no_criterion && !allow_fragment {
            return Err(NetworkError::MissingCriterion);
        }
        let outputs = self.output_nodes.clone();
        if outputs.is_empty() && !allow_fragment {
            return Err(NetworkError::MissingOutput);
        }
        let evaluations = self.evaluation_nodes.clone();

        let roots: Vec<NodeId> = criteria.into_iter().chain(outputs).chain(evaluations).collect();
        for &root in &roots {
            if !allow_fragment {
                self.form_recurrent_loops(root)?;
            }
            self.validate_sub_network(root)?;
        }
        self.allocate_all_eval_matrices(&roots)
    }

    /// 让`roots`子网络并集中的每个节点都拥有与其校验后形状一致的值与梯度矩阵
    pub fn allocate_all_eval_matrices(&mut self, roots: &[NodeId]) -> Result<(), NetworkError> {
        let mut all = BTreeSet::new();
        for &root in roots {
            all.extend(self.get_eval_order(root)?);
        }
        for id in all {
            let node = self.get_node_mut(id)?;
            if !node.is_leaf() {
                node.update_function_mb_size();
            }
            node.ensure_grad_shape();
        }
        Ok(())
    }
}
