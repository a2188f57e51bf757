use crate::nn::NetworkError;
use crate::nn::layout::FrameRange;
use crate::nn::nodes::raw_node::{
    ChildGradient, ChildResize, NodeView, TraitNode, ValidationContext, ValidationOutcome,
    dimension_mismatch, gradient_to_input, input_block, input_columns,
};
use crate::nn::nodes::{ImageLayout, NodeHandle};
use crate::tensor::Tensor;

/// 矩阵乘法节点`W · x`
///
/// forward: y = W · x（x的每一列独立相乘，因此可以逐帧计算）
/// backward: dW += g · xᵀ，dx += Wᵀ · g
///
/// 若`W`是列数未定（为0）的叶节点，校验时由`x`的行数推断出其列数。
#[derive(Debug, Clone, Default)]
pub(in crate::nn) struct Times;

impl TraitNode for Times {
    fn operation_name(&self) -> &'static str {
        "Times"
    }

    fn num_inputs(&self) -> Option<usize> {
        Some(2)
    }

    fn validate(
        &self,
        ctx: &ValidationContext<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<ValidationOutcome, NetworkError> {
        let (w, x) = (inputs[0], inputs[1]);
        let mut child_resizes = Vec::new();
        let mut w_cols = w.cols();
        if w_cols == 0 && w.is_leaf() && x.rows() > 0 {
            w_cols = x.rows();
            child_resizes.push(ChildResize {
                index: 0,
                rows: w.rows(),
                cols: w_cols,
            });
        }

        if ctx.is_final && w_cols != x.rows() {
            return Err(dimension_mismatch(
                ctx.name,
                self.operation_name(),
                format!(
                    "左操作数{}为[{}, {}]，右操作数{}有{}行",
                    w.name(),
                    w.rows(),
                    w_cols,
                    x.name(),
                    x.rows()
                ),
            ));
        }

        let mb_layout = x.mb_layout().cloned();
        let cols = match &mb_layout {
            Some(layout) => layout.borrow().num_cols(),
            None => x.cols(),
        };
        Ok(ValidationOutcome {
            rows: w.rows(),
            cols,
            mb_layout,
            image_layout: ImageLayout::vector(w.rows()),
            child_resizes,
        })
    }

    fn evaluate(
        &self,
        fr: FrameRange,
        this: &NodeView<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<Tensor, NetworkError> {
        let w = input_block(inputs[0], FrameRange::AllFrames);
        let x = input_block(inputs[1], fr);
        if w.cols() != x.rows() {
            return Err(dimension_mismatch(
                this.name,
                self.operation_name(),
                format!("无法计算[{}, {}] · [{}, {}]", w.rows(), w.cols(), x.rows(), x.cols()),
            ));
        }
        Ok(w.mat_mul(&x))
    }

    fn compute_gradient(
        &self,
        index: usize,
        fr: FrameRange,
        this: &NodeView<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<Option<ChildGradient>, NetworkError> {
        let g = this.grad.columns(this.columns(fr));
        match index {
            0 => {
                let x = input_block(inputs[1], fr);
                Ok(Some(ChildGradient {
                    index,
                    columns: input_columns(inputs[0], FrameRange::AllFrames),
                    value: g.mat_mul(&x.transpose()),
                }))
            }
            _ => {
                let w = input_block(inputs[0], FrameRange::AllFrames);
                Ok(Some(gradient_to_input(
                    index,
                    inputs[1],
                    fr,
                    w.transpose().mat_mul(&g),
                )))
            }
        }
    }
}
