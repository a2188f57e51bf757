use crate::nn::NetworkError;
use crate::nn::layout::FrameRange;
use crate::nn::nodes::raw_node::{
    ChildGradient, NodeView, TraitNode, ValidationContext, ValidationOutcome, dimension_mismatch,
    input_block, input_columns,
};
use crate::nn::nodes::{ImageLayout, NodeHandle};
use crate::tensor::Tensor;

/// 平方误差准则节点，输出标量
///
/// forward: y = Σ (a - b)²
/// backward: da += 2g(a - b)，db -= 2g(a - b)
#[derive(Debug, Clone, Default)]
pub(in crate::nn) struct SquareError;

impl TraitNode for SquareError {
    fn operation_name(&self) -> &'static str {
        "SquareError"
    }

    fn num_inputs(&self) -> Option<usize> {
        Some(2)
    }

    fn validate(
        &self,
        ctx: &ValidationContext<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<ValidationOutcome, NetworkError> {
        let (a, b) = (inputs[0], inputs[1]);
        if ctx.is_final && a.dims() != b.dims() {
            return Err(dimension_mismatch(
                ctx.name,
                self.operation_name(),
                format!(
                    "{}为{:?}，{}为{:?}",
                    a.name(),
                    a.dims(),
                    b.name(),
                    b.dims()
                ),
            ));
        }
        Ok(ValidationOutcome {
            rows: 1,
            cols: 1,
            mb_layout: None,
            image_layout: ImageLayout::vector(1),
            child_resizes: Vec::new(),
        })
    }

    fn evaluate(
        &self,
        fr: FrameRange,
        this: &NodeView<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<Tensor, NetworkError> {
        let diff = self.difference(fr, this, inputs)?;
        Ok(Tensor::new(&[(&diff * &diff).sum()], &[1, 1]))
    }

    fn compute_gradient(
        &self,
        index: usize,
        fr: FrameRange,
        this: &NodeView<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<Option<ChildGradient>, NetworkError> {
        let g = this.grad[[0, 0]];
        let sign = if index == 0 { 2.0 } else { -2.0 };
        let diff = self.difference(fr, this, inputs)?;
        Ok(Some(ChildGradient {
            index,
            columns: input_columns(inputs[index], fr),
            value: diff.scale(sign * g),
        }))
    }
}

impl SquareError {
    fn difference(
        &self,
        fr: FrameRange,
        this: &NodeView<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<Tensor, NetworkError> {
        let a = input_block(inputs[0], fr);
        let b = input_block(inputs[1], fr);
        if a.dims() != b.dims() {
            return Err(dimension_mismatch(
                this.name,
                self.operation_name(),
                format!("无法比较{:?}与{:?}", a.dims(), b.dims()),
            ));
        }
        Ok(&a - &b)
    }
}
