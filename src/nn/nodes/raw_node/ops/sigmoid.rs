use crate::nn::NetworkError;
use crate::nn::layout::FrameRange;
use crate::nn::nodes::NodeHandle;
use crate::nn::nodes::raw_node::{
    ChildGradient, NodeView, TraitNode, ValidationContext, ValidationOutcome, gradient_to_input,
    input_block, validate_unary_elementwise,
};
use crate::tensor::Tensor;

/// Sigmoid激活函数节点
///
/// forward: σ(x) = 1 / (1 + e^(-x))
/// backward: dx += g ⊙ σ(x) ⊙ (1 - σ(x))
#[derive(Debug, Clone, Default)]
pub(in crate::nn) struct Sigmoid;

impl TraitNode for Sigmoid {
    fn operation_name(&self) -> &'static str {
        "Sigmoid"
    }

    fn num_inputs(&self) -> Option<usize> {
        Some(1)
    }

    fn validate(
        &self,
        _ctx: &ValidationContext<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<ValidationOutcome, NetworkError> {
        Ok(validate_unary_elementwise(inputs))
    }

    fn evaluate(
        &self,
        fr: FrameRange,
        _this: &NodeView<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<Tensor, NetworkError> {
        Ok(input_block(inputs[0], fr).sigmoid())
    }

    fn compute_gradient(
        &self,
        index: usize,
        fr: FrameRange,
        this: &NodeView<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<Option<ChildGradient>, NetworkError> {
        let columns = this.columns(fr);
        let y = this.value.columns(columns.clone());
        let g = this.grad.columns(columns);
        let derivative = y.map(|v| v * (1.0 - v));
        Ok(Some(gradient_to_input(index, inputs[0], fr, &g * &derivative)))
    }
}
