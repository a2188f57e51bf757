use crate::nn::NetworkError;
use crate::nn::layout::FrameRange;
use crate::nn::nodes::NodeHandle;
use crate::nn::nodes::raw_node::{
    ChildGradient, NodeView, TraitNode, ValidationContext, ValidationOutcome, gradient_to_input,
    input_block_with_width, validate_binary_elementwise,
};
use crate::tensor::Tensor;

/// 逐元素相减节点
///
/// forward: y = a - b
/// backward: da += g，db -= g
#[derive(Debug, Clone, Default)]
pub(in crate::nn) struct Minus;

impl TraitNode for Minus {
    fn operation_name(&self) -> &'static str {
        "Minus"
    }

    fn num_inputs(&self) -> Option<usize> {
        Some(2)
    }

    fn validate(
        &self,
        ctx: &ValidationContext<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<ValidationOutcome, NetworkError> {
        validate_binary_elementwise(self.operation_name(), ctx, inputs)
    }

    fn evaluate(
        &self,
        fr: FrameRange,
        this: &NodeView<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<Tensor, NetworkError> {
        let width = this.columns(fr).len();
        let a = input_block_with_width(this.name, self.operation_name(), inputs[0], fr, width)?;
        let b = input_block_with_width(this.name, self.operation_name(), inputs[1], fr, width)?;
        Ok(&a - &b)
    }

    fn compute_gradient(
        &self,
        index: usize,
        fr: FrameRange,
        this: &NodeView<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<Option<ChildGradient>, NetworkError> {
        let g = this.grad.columns(this.columns(fr));
        let g = if index == 0 { g } else { -&g };
        Ok(Some(gradient_to_input(index, inputs[index], fr, g)))
    }
}
