/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 各类运算节点的公共特性（TraitNode）与分发枚举（NodeType）
 *
 * 网络只通过 TraitNode 调用节点自身的数学（校验、前向、对子节点求梯度），
 * 节点值、梯度、时间戳、布局等公共状态由外层的 NodeHandle 统一管理。
 */

mod delay;
mod input;
mod ops;
mod parameter;

pub(in crate::nn) use delay::DelayedValue;
pub(in crate::nn) use input::InputValue;
pub(in crate::nn) use ops::*;
pub use parameter::Init;
pub(in crate::nn) use parameter::LearnableParameter;

use super::{ImageLayout, NodeHandle};
use crate::nn::NetworkError;
use crate::nn::layout::{FrameRange, MbLayout, MbLayoutPtr, SteppingDirection};
use crate::tensor::Tensor;
use enum_dispatch::enum_dispatch;
use rand::rngs::StdRng;
use std::ops::Range;

#[enum_dispatch]
#[derive(Debug, Clone)]
pub(in crate::nn) enum NodeType {
    InputValue(InputValue),
    LearnableParameter(LearnableParameter),
    Times(Times),
    Plus(Plus),
    Minus(Minus),
    ElementTimes(ElementTimes),
    Sigmoid(Sigmoid),
    Tanh(Tanh),
    SumElements(SumElements),
    SquareError(SquareError),
    Delay(DelayedValue),
}

/// 校验时节点能看到的上下文
pub(in crate::nn) struct ValidationContext<'a> {
    pub name: &'a str,
    /// 网络共享的小批量布局
    pub network_layout: &'a MbLayoutPtr,
    /// 本节点当前挂接的布局
    pub own_layout: Option<&'a MbLayoutPtr>,
    pub own_dims: (usize, usize),
    pub is_final: bool,
}

/// 校验结果：本节点推断出的形状与布局，以及对子节点维度的推断
#[derive(Debug)]
pub(in crate::nn) struct ValidationOutcome {
    pub rows: usize,
    pub cols: usize,
    pub mb_layout: Option<MbLayoutPtr>,
    pub image_layout: ImageLayout,
    pub child_resizes: Vec<ChildResize>,
}

/// 由父节点推断出的子节点新维度（如`Times`推断其左参数的列数）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(in crate::nn) struct ChildResize {
    pub index: usize,
    pub rows: usize,
    pub cols: usize,
}

/// 某个子节点在`columns`列上收到的梯度贡献
#[derive(Debug)]
pub(in crate::nn) struct ChildGradient {
    pub index: usize,
    pub columns: Range<usize>,
    pub value: Tensor,
}

/// 求值/求梯度时节点自身状态的只读视图
pub(in crate::nn) struct NodeView<'a> {
    pub name: &'a str,
    pub value: &'a Tensor,
    pub grad: &'a Tensor,
    pub layout: Option<&'a MbLayout>,
}

impl NodeView<'_> {
    /// 本节点在`fr`上的列区间
    pub fn columns(&self, fr: FrameRange) -> Range<usize> {
        fr.column_range(self.layout, self.value.cols())
    }
}

#[enum_dispatch(NodeType)]
pub(in crate::nn) trait TraitNode {
    /// 运算名（如"Times"），只用于诊断与识别
    fn operation_name(&self) -> &'static str;

    /// 期望的输入个数，None 表示不作限制
    fn num_inputs(&self) -> Option<usize>;

    fn is_input(&self) -> bool {
        false
    }

    /// 返回该节点的参数是否应该在训练过程中被更新
    fn is_parameter_update_required(&self) -> bool {
        false
    }

    fn requires_pre_compute(&self) -> bool {
        false
    }

    /// 延迟节点返回其闭合循环时的步进方向
    fn delay_direction(&self) -> Option<SteppingDirection> {
        None
    }

    /// 根据子节点推断本节点的形状与布局；`is_final`时还须做一致性检查
    fn validate(
        &self,
        ctx: &ValidationContext<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<ValidationOutcome, NetworkError>;

    /// 计算本节点在`fr`上的值，返回的块宽度须与`this.columns(fr)`一致
    fn evaluate(
        &self,
        fr: FrameRange,
        this: &NodeView<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<Tensor, NetworkError>;

    /// 将本节点在`fr`上的梯度传给第`index`个子节点；无贡献时返回 None
    fn compute_gradient(
        &self,
        index: usize,
        fr: FrameRange,
        this: &NodeView<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<Option<ChildGradient>, NetworkError>;

    fn on_evaluate_begin_iteration(&mut self) {}

    /// 一轮前向结束（延迟节点在此保存跨小批量的状态）
    fn on_evaluate_end_iteration(&mut self, _inputs: &[&NodeHandle]) {}

    fn on_compute_gradient_begin_iteration(&mut self) {}

    fn on_compute_gradient_end_iteration(&mut self) {}

    /// 形状改变（如被父节点推断出维度）时重新生成的初始值
    fn initial_value(&self, _rows: usize, _cols: usize, _rng: &mut StdRng) -> Option<Tensor> {
        None
    }

    /// 构造参数的简短描述，用于打印
    fn describe_params(&self) -> Option<String> {
        None
    }
}

// ========== 各运算共用的小工具 ==========

pub(in crate::nn) fn dimension_mismatch(name: &str, operation: &str, message: String) -> NetworkError {
    NetworkError::DimensionMismatch {
        node: name.to_string(),
        operation: operation.to_string(),
        message,
    }
}

/// 子节点在`fr`上的列区间：带布局的子节点取对应帧，否则取全部列
pub(in crate::nn) fn input_columns(input: &NodeHandle, fr: FrameRange) -> Range<usize> {
    let layout = input.mb_layout().map(|l| l.borrow());
    fr.column_range(layout.as_deref(), input.cols())
}

/// 子节点在`fr`上的值
pub(in crate::nn) fn input_block(input: &NodeHandle, fr: FrameRange) -> Tensor {
    input.value().columns(input_columns(input, fr))
}

/// 子节点在`fr`上的值，并按需把单列广播到`width`列
pub(in crate::nn) fn input_block_with_width(
    name: &str,
    operation: &str,
    input: &NodeHandle,
    fr: FrameRange,
    width: usize,
) -> Result<Tensor, NetworkError> {
    let block = input_block(input, fr);
    if block.cols() == width || block.cols() == 1 {
        Ok(block.broadcast_columns(width))
    } else {
        Err(dimension_mismatch(
            name,
            operation,
            format!(
                "子节点{}提供{}列，无法与{}列对齐",
                input.name(),
                block.cols(),
                width
            ),
        ))
    }
}

/// 把对本节点块的梯度`grad`折算到第`index`个子节点上：
/// 带布局的子节点收到同一帧的列；被广播的单列子节点收到按行求和的结果
pub(in crate::nn) fn gradient_to_input(
    index: usize,
    input: &NodeHandle,
    fr: FrameRange,
    grad: Tensor,
) -> ChildGradient {
    if input.has_mb_layout() || input.cols() == grad.cols() {
        ChildGradient {
            index,
            columns: input_columns(input, fr),
            value: grad,
        }
    } else {
        ChildGradient {
            index,
            columns: 0..1,
            value: grad.sum_columns(),
        }
    }
}

/// 逐元素二元运算共用的校验：行数取两者之大者，布局取第一个带布局的子节点
pub(in crate::nn) fn validate_binary_elementwise(
    operation: &str,
    ctx: &ValidationContext<'_>,
    inputs: &[&NodeHandle],
) -> Result<ValidationOutcome, NetworkError> {
    let (a, b) = (inputs[0], inputs[1]);
    let rows = a.rows().max(b.rows());
    let mb_layout = a.mb_layout().or(b.mb_layout()).cloned();
    let cols = match &mb_layout {
        Some(layout) => layout.borrow().num_cols(),
        None => a.cols().max(b.cols()),
    };

    if ctx.is_final {
        for input in [a, b] {
            if input.rows() != rows {
                return Err(dimension_mismatch(
                    ctx.name,
                    operation,
                    format!(
                        "子节点{}的行数为{}，期望{}",
                        input.name(),
                        input.rows(),
                        rows
                    ),
                ));
            }
            if !input.has_mb_layout() && input.cols() != cols && input.cols() != 1 {
                return Err(dimension_mismatch(
                    ctx.name,
                    operation,
                    format!(
                        "子节点{}的列数为{}，既不是{}也不是可广播的单列",
                        input.name(),
                        input.cols(),
                        cols
                    ),
                ));
            }
        }
    }

    let image_layout = if a.rows() == rows {
        a.image_layout()
    } else {
        b.image_layout()
    };
    Ok(ValidationOutcome {
        rows,
        cols,
        mb_layout,
        image_layout,
        child_resizes: Vec::new(),
    })
}

/// 一元逐元素运算共用的校验：形状、布局都沿用唯一的子节点
pub(in crate::nn) fn validate_unary_elementwise(inputs: &[&NodeHandle]) -> ValidationOutcome {
    let input = inputs[0];
    ValidationOutcome {
        rows: input.rows(),
        cols: input.cols(),
        mb_layout: input.mb_layout().cloned(),
        image_layout: input.image_layout(),
        child_resizes: Vec::new(),
    }
}
