use super::{ChildGradient, NodeView, TraitNode, ValidationContext, ValidationOutcome};
use crate::nn::NetworkError;
use crate::nn::layout::FrameRange;
use crate::nn::nodes::{ImageLayout, NodeHandle};
use crate::tensor::Tensor;

/// 输入节点：值由外部（读取器）按小批量写入，带网络共享的布局
#[derive(Debug, Clone)]
pub(in crate::nn) struct InputValue {
    rows: usize,
}

impl InputValue {
    pub(in crate::nn) const fn new(rows: usize) -> Self {
        Self { rows }
    }
}

impl TraitNode for InputValue {
    fn operation_name(&self) -> &'static str {
        "InputValue"
    }

    fn num_inputs(&self) -> Option<usize> {
        Some(0)
    }

    fn is_input(&self) -> bool {
        true
    }

    fn validate(
        &self,
        ctx: &ValidationContext<'_>,
        _inputs: &[&NodeHandle],
    ) -> Result<ValidationOutcome, NetworkError> {
        let mb_layout = ctx.own_layout.unwrap_or(ctx.network_layout).clone();
        let layout_cols = mb_layout.borrow().num_cols();
        // 布局尚为空时沿用当前值的列数
        let cols = if layout_cols == 0 {
            ctx.own_dims.1
        } else {
            layout_cols
        };
        Ok(ValidationOutcome {
            rows: self.rows,
            cols,
            mb_layout: Some(mb_layout),
            image_layout: ImageLayout::vector(self.rows),
            child_resizes: Vec::new(),
        })
    }

    fn evaluate(
        &self,
        fr: FrameRange,
        this: &NodeView<'_>,
        _inputs: &[&NodeHandle],
    ) -> Result<Tensor, NetworkError> {
        Ok(this.value.columns(this.columns(fr)))
    }

    fn compute_gradient(
        &self,
        _index: usize,
        _fr: FrameRange,
        _this: &NodeView<'_>,
        _inputs: &[&NodeHandle],
    ) -> Result<Option<ChildGradient>, NetworkError> {
        Ok(None)
    }
}
