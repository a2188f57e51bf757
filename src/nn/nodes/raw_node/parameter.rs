use super::{ChildGradient, NodeView, TraitNode, ValidationContext, ValidationOutcome};
use crate::nn::NetworkError;
use crate::nn::layout::FrameRange;
use crate::nn::nodes::{ImageLayout, NodeHandle};
use crate::tensor::Tensor;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// 参数初始化方式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Init {
    /// 所有元素取同一个常数
    Constant(f32),
    /// 在[-scale, scale]内均匀分布（使用网络的随机数生成器）
    Uniform { scale: f32 },
    /// 按行优先顺序给出的具体数值，长度须与形状一致
    Values(Vec<f32>),
}

impl Init {
    pub(in crate::nn) fn generate(&self, rows: usize, cols: usize, rng: &mut StdRng) -> Option<Tensor> {
        match self {
            Self::Constant(value) => Some(Tensor::filled(*value, &[rows, cols])),
            Self::Uniform { scale } => Some(Tensor::new_uniform(*scale, &[rows, cols], rng)),
            Self::Values(values) if values.len() == rows * cols => Some(Tensor::new(values, &[rows, cols])),
            Self::Values(_) => None,
        }
    }
}

/// 可学习参数：没有子节点也没有布局，形状可由父节点（如`Times`）推断补全
#[derive(Debug, Clone)]
pub(in crate::nn) struct LearnableParameter {
    init: Init,
    update_required: bool,
}

impl LearnableParameter {
    pub(in crate::nn) const fn new(init: Init) -> Self {
        Self {
            init,
            update_required: true,
        }
    }

    pub(in crate::nn) fn set_update_required(&mut self, update_required: bool) {
        self.update_required = update_required;
    }
}

impl TraitNode for LearnableParameter {
    fn operation_name(&self) -> &'static str {
        "LearnableParameter"
    }

    fn num_inputs(&self) -> Option<usize> {
        Some(0)
    }

    fn is_parameter_update_required(&self) -> bool {
        self.update_required
    }

    fn validate(
        &self,
        ctx: &ValidationContext<'_>,
        _inputs: &[&NodeHandle],
    ) -> Result<ValidationOutcome, NetworkError> {
        let (rows, cols) = ctx.own_dims;
        Ok(ValidationOutcome {
            rows,
            cols,
            mb_layout: None,
            image_layout: ImageLayout::vector(rows),
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

    fn initial_value(&self, rows: usize, cols: usize, rng: &mut StdRng) -> Option<Tensor> {
        self.init.generate(rows, cols, rng)
    }

    fn describe_params(&self) -> Option<String> {
        let init = match &self.init {
            Init::Constant(value) => format!("init=Constant({value})"),
            Init::Uniform { scale } => format!("init=Uniform({scale})"),
            Init::Values(values) => format!("init=Values(len={})", values.len()),
        };
        if self.update_required {
            Some(init)
        } else {
            Some(format!("{init}, fixed"))
        }
    }
}
