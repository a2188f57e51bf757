use crate::nn::NetworkError;
use crate::nn::layout::FrameRange;
use crate::nn::nodes::raw_node::{
    ChildGradient, NodeView, TraitNode, ValidationContext, ValidationOutcome, input_block,
    input_columns,
};
use crate::nn::nodes::{ImageLayout, NodeHandle};
use crate::tensor::Tensor;

/// 求和节点：把输入的所有元素加成一个标量（`1×1`，无布局）
#[derive(Debug, Clone, Default)]
pub(in crate::nn) struct SumElements;

impl TraitNode for SumElements {
    fn operation_name(&self) -> &'static str {
        "SumElements"
    }

    fn num_inputs(&self) -> Option<usize> {
        Some(1)
    }

    fn validate(
        &self,
        _ctx: &ValidationContext<'_>,
        _inputs: &[&NodeHandle],
    ) -> Result<ValidationOutcome, NetworkError> {
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
        _this: &NodeView<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<Tensor, NetworkError> {
        let sum = input_block(inputs[0], fr).sum();
        Ok(Tensor::new(&[sum], &[1, 1]))
    }

    fn compute_gradient(
        &self,
        index: usize,
        fr: FrameRange,
        this: &NodeView<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<Option<ChildGradient>, NetworkError> {
        let g = this.grad[[0, 0]];
        let columns = input_columns(inputs[0], fr);
        Ok(Some(ChildGradient {
            index,
            value: Tensor::filled(g, &[inputs[0].rows(), columns.len()]),
            columns,
        }))
    }
}
