/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 网络中节点的句柄：节点自身的运算（raw_node）加上所有节点共有的状态
 *                 （值、梯度、布局、求值时间戳、访问标记等）
 */

use super::raw_node::{NodeType, NodeView, TraitNode};
use crate::nn::format_node_display;
use crate::nn::layout::{FrameRange, MbLayoutPtr};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 节点输出的图像布局（宽 × 高 × 通道），对普通向量即`1 × rows × 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageLayout {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
}

impl ImageLayout {
    pub const fn vector(rows: usize) -> Self {
        Self {
            width: 1,
            height: rows,
            channels: 1,
        }
    }
}

/// 节点的运行统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStats {
    /// 前向计算（整批或单帧）被执行的次数
    pub evaluations: usize,
    /// 本节点向子节点传递梯度的次数
    pub gradient_computations: usize,
}

#[derive(Debug, Clone)]
pub(in crate::nn) struct NodeHandle {
    id: NodeId,
    name: String,
    children: Vec<NodeId>,
    raw_node: NodeType,
    value: Tensor,
    grad: Tensor,
    image_layout: ImageLayout,
    mb_layout: Option<MbLayoutPtr>,
    eval_time_stamp: u64,
    visited: bool,
    needs_gradient: bool,
    part_of_loop: bool,
    stats: NodeStats,
}

impl NodeHandle {
    pub fn new<T: Into<NodeType>>(id: NodeId, name: &str, raw_node: T, rows: usize, cols: usize) -> Self {
        Self {
            id,
            name: name.to_string(),
            children: Vec::new(),
            raw_node: raw_node.into(),
            value: Tensor::zeros(&[rows, cols]),
            grad: Tensor::zeros(&[rows, cols]),
            image_layout: ImageLayout::vector(rows),
            mb_layout: None,
            eval_time_stamp: 0,
            visited: false,
            needs_gradient: false,
            part_of_loop: false,
            stats: NodeStats::default(),
        }
    }

    pub const fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operation_name(&self) -> &'static str {
        self.raw_node.operation_name()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn set_children(&mut self, children: Vec<NodeId>) {
        self.children = children;
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub const fn raw_node(&self) -> &NodeType {
        &self.raw_node
    }

    pub fn raw_node_mut(&mut self) -> &mut NodeType {
        &mut self.raw_node
    }

    // ========== 值与梯度 ==========

    pub const fn value(&self) -> &Tensor {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Tensor {
        &mut self.value
    }

    pub fn set_value(&mut self, value: &Tensor) {
        self.value.set_value(value);
    }

    pub const fn grad(&self) -> &Tensor {
        &self.grad
    }

    pub fn grad_mut(&mut self) -> &mut Tensor {
        &mut self.grad
    }

    pub fn rows(&self) -> usize {
        self.value.rows()
    }

    pub fn cols(&self) -> usize {
        self.value.cols()
    }

    pub fn dims(&self) -> (usize, usize) {
        self.value.dims()
    }

    /// 按布局把值的列数调整为`T * S`（只对带布局的节点有效）
    pub fn update_function_mb_size(&mut self) {
        if let Some(layout) = &self.mb_layout {
            let cols = layout.borrow().num_cols();
            let rows = self.value.rows();
            self.value.resize(rows, cols);
        }
    }

    /// 让梯度与值同形；形状改变时梯度被清零
    pub fn ensure_grad_shape(&mut self) {
        let (rows, cols) = self.value.dims();
        self.grad.resize(rows, cols);
    }

    /// 把`fr`范围内落在空隙上的列清零（多序列处理）
    pub fn mask_gap_columns(&mut self, fr: FrameRange, gradient: bool) {
        let Some(layout) = &self.mb_layout else {
            return;
        };
        let layout = layout.borrow();
        if !layout.has_gaps() {
            return;
        }
        let target = if gradient { &mut self.grad } else { &mut self.value };
        let range = fr.column_range(Some(&layout), target.cols());
        for j in layout.gap_columns(range) {
            target.zero_columns(j..j + 1);
        }
    }

    /// 以只读视图的形式把本节点交给运算实现
    pub fn with_view<R>(&self, f: impl FnOnce(&NodeView<'_>) -> R) -> R {
        let layout = self.mb_layout.as_ref().map(|l| l.borrow());
        let view = NodeView {
            name: &self.name,
            value: &self.value,
            grad: &self.grad,
            layout: layout.as_deref(),
        };
        f(&view)
    }

    // ========== 布局 ==========

    pub const fn mb_layout(&self) -> Option<&MbLayoutPtr> {
        self.mb_layout.as_ref()
    }

    pub const fn has_mb_layout(&self) -> bool {
        self.mb_layout.is_some()
    }

    pub fn set_mb_layout(&mut self, layout: Option<MbLayoutPtr>) {
        self.mb_layout = layout;
    }

    /// 是否与`other`共享同一个布局对象（两者都没有布局也算一致）
    pub fn shares_layout_with(&self, other: Option<&MbLayoutPtr>) -> bool {
        match (&self.mb_layout, other) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    pub const fn image_layout(&self) -> ImageLayout {
        self.image_layout
    }

    pub fn set_image_layout(&mut self, layout: ImageLayout) {
        self.image_layout = layout;
    }

    // ========== 遍历/求值状态 ==========

    pub const fn eval_time_stamp(&self) -> u64 {
        self.eval_time_stamp
    }

    pub fn set_eval_time_stamp(&mut self, stamp: u64) {
        self.eval_time_stamp = stamp;
    }

    pub const fn is_visited(&self) -> bool {
        self.visited
    }

    pub fn set_visited(&mut self, visited: bool) {
        self.visited = visited;
    }

    pub const fn needs_gradient(&self) -> bool {
        self.needs_gradient
    }

    pub fn set_needs_gradient(&mut self, needs_gradient: bool) {
        self.needs_gradient = needs_gradient;
    }

    pub const fn is_part_of_loop(&self) -> bool {
        self.part_of_loop
    }

    pub fn set_part_of_loop(&mut self, part_of_loop: bool) {
        self.part_of_loop = part_of_loop;
    }

    pub const fn stats(&self) -> NodeStats {
        self.stats
    }

    pub fn record_evaluation(&mut self) {
        self.stats.evaluations += 1;
    }

    pub fn record_gradient_computation(&mut self) {
        self.stats.gradient_computations += 1;
    }
}

impl std::fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            format_node_display(self.id, &self.name, self.operation_name())
        )
    }
}
