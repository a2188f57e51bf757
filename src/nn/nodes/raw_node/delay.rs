/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 延迟节点（PastValue / FutureValue）
 *
 * `PastValue(k)`在第t帧输出其输入在第t-k帧的值，`FutureValue(k)`输出第t+k帧的值。
 * 越过序列边界或小批量边界时输出初始值；唯一的例外是`PastValue`所在序列
 * 并未在本小批量内开始时，接着使用上一个小批量保存下来的状态（截断BPTT）。
 * 这两种节点是网络中唯一允许闭合环路的边。
 */

use super::{ChildGradient, NodeView, TraitNode, ValidationContext, ValidationOutcome, dimension_mismatch};
use crate::nn::NetworkError;
use crate::nn::layout::{FrameRange, MbLayout, SteppingDirection};
use crate::nn::nodes::{ImageLayout, NodeHandle};
use crate::tensor::Tensor;

/// 某个小批量结束时输入的值，供下一个小批量开头的`PastValue`读取
#[derive(Debug, Clone)]
struct CarryOver {
    value: Tensor,
    num_time_steps: usize,
    num_parallel_sequences: usize,
    /// 保存时布局的`generation`
    generation: u64,
}

/// 某个`(t, s)`位置的数据来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// 本小批量输入的第j列
    Current(usize),
    /// 上一个小批量输入的第j列
    Previous(usize),
    Initial,
}

#[derive(Debug, Clone)]
pub(in crate::nn) struct DelayedValue {
    direction: SteppingDirection,
    time_step: usize,
    rows: usize,
    initial_activation: f32,
    /// 最近一次前向结束时保存的状态
    latest: Option<CarryOver>,
    /// `latest`所属小批量之前的那个小批量的状态
    previous: Option<CarryOver>,
}

impl DelayedValue {
    /// `direction`为`Forward`即`PastValue`，为`Backward`即`FutureValue`
    pub(in crate::nn) const fn new(
        direction: SteppingDirection,
        rows: usize,
        time_step: usize,
        initial_activation: f32,
    ) -> Self {
        Self {
            direction,
            time_step,
            rows,
            initial_activation,
            latest: None,
            previous: None,
        }
    }

    /// 丢弃跨小批量保存的状态（下一个小批量从初始值开始）
    pub(in crate::nn) fn reset_state(&mut self) {
        self.latest = None;
        self.previous = None;
    }

    /// 当前小批量应读取的上一个小批量的状态。
    /// 同一小批量被重复计算时，`latest`已是本小批量自己的状态，须改读`previous`。
    fn carry_over(&self, layout: &MbLayout) -> Option<&CarryOver> {
        match &self.latest {
            Some(latest) if latest.generation != layout.generation() => Some(latest),
            _ => self.previous.as_ref(),
        }
    }

    fn source(&self, layout: &MbLayout, t: usize, s: usize) -> Source {
        let k = self.time_step;
        let num_time_steps = layout.num_time_steps();
        match self.direction {
            SteppingDirection::Forward => {
                if t >= k {
                    let src = t - k;
                    // 序列在(src, t]内重新开始，则src属于另一条序列
                    if (src + 1..=t).any(|u| layout.is_sequence_start(s, u)) {
                        Source::Initial
                    } else {
                        Source::Current(layout.column_index(src, s))
                    }
                } else if (0..=t).any(|u| layout.is_sequence_start(s, u)) {
                    Source::Initial
                } else {
                    match self.carry_over(layout) {
                        Some(prev)
                            if prev.num_parallel_sequences == layout.num_parallel_sequences()
                                && prev.num_time_steps + t >= k =>
                        {
                            let src = prev.num_time_steps + t - k;
                            Source::Previous(src * prev.num_parallel_sequences + s)
                        }
                        _ => Source::Initial,
                    }
                }
            }
            SteppingDirection::Backward => {
                let src = t + k;
                if src >= num_time_steps || (t..src).any(|u| layout.is_sequence_end(s, u)) {
                    Source::Initial
                } else {
                    Source::Current(layout.column_index(src, s))
                }
            }
        }
    }

    /// 第t帧在输入上对应的帧（越界时为None）
    fn source_frame(&self, layout: &MbLayout, t: usize) -> Option<usize> {
        match self.direction {
            SteppingDirection::Forward => t.checked_sub(self.time_step),
            SteppingDirection::Backward => {
                let src = t + self.time_step;
                (src < layout.num_time_steps()).then_some(src)
            }
        }
    }

    fn missing_layout(&self, name: &str) -> NetworkError {
        NetworkError::InvalidOperation(format!(
            "{}节点{name}没有小批量布局，无法按时间步取值",
            self.operation_name()
        ))
    }
}

impl TraitNode for DelayedValue {
    fn operation_name(&self) -> &'static str {
        match self.direction {
            SteppingDirection::Forward => "PastValue",
            SteppingDirection::Backward => "FutureValue",
        }
    }

    fn num_inputs(&self) -> Option<usize> {
        Some(1)
    }

    fn delay_direction(&self) -> Option<SteppingDirection> {
        Some(self.direction)
    }

    fn validate(
        &self,
        ctx: &ValidationContext<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<ValidationOutcome, NetworkError> {
        let input = inputs[0];
        // 在循环中本节点先于其输入被校验，此时只能用声明的行数
        let rows = if input.rows() > 0 { input.rows() } else { self.rows };
        if ctx.is_final && self.rows > 0 && input.rows() != self.rows {
            return Err(dimension_mismatch(
                ctx.name,
                self.operation_name(),
                format!("声明了{}行，但输入{}有{}行", self.rows, input.name(), input.rows()),
            ));
        }
        let mb_layout = input
            .mb_layout()
            .or(ctx.own_layout)
            .unwrap_or(ctx.network_layout)
            .clone();
        let cols = mb_layout.borrow().num_cols();
        Ok(ValidationOutcome {
            rows,
            cols,
            mb_layout: Some(mb_layout),
            image_layout: ImageLayout::vector(rows),
            child_resizes: Vec::new(),
        })
    }

    fn evaluate(
        &self,
        fr: FrameRange,
        this: &NodeView<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<Tensor, NetworkError> {
        let layout = this.layout.ok_or_else(|| self.missing_layout(this.name))?;
        let input = inputs[0].value();
        if input.cols() != layout.num_cols() {
            return Err(dimension_mismatch(
                this.name,
                self.operation_name(),
                format!(
                    "输入{}有{}列，与布局的{}列不符",
                    inputs[0].name(),
                    input.cols(),
                    layout.num_cols()
                ),
            ));
        }
        let frames = match fr.time_index() {
            Some(t) => t..t + 1,
            None => 0..layout.num_time_steps(),
        };
        let num_sequences = layout.num_parallel_sequences();
        let mut out = Tensor::zeros(&[this.value.rows(), frames.len() * num_sequences]);
        let initial = Tensor::filled(self.initial_activation, &[this.value.rows(), 1]);

        for (i, t) in frames.enumerate() {
            for s in 0..num_sequences {
                let j = i * num_sequences + s;
                let column = match self.source(layout, t, s) {
                    Source::Current(src) => input.columns(src..src + 1),
                    Source::Previous(src) => match self.carry_over(layout) {
                        Some(prev) => prev.value.columns(src..src + 1),
                        None => initial.clone(),
                    },
                    Source::Initial => initial.clone(),
                };
                out.set_columns(j..j + 1, &column);
            }
        }
        Ok(out)
    }

    fn compute_gradient(
        &self,
        _index: usize,
        fr: FrameRange,
        this: &NodeView<'_>,
        inputs: &[&NodeHandle],
    ) -> Result<Option<ChildGradient>, NetworkError> {
        let layout = this.layout.ok_or_else(|| self.missing_layout(this.name))?;
        let num_sequences = layout.num_parallel_sequences();
        let rows = inputs[0].rows();

        match fr.time_index() {
            Some(t) => {
                let Some(src) = self.source_frame(layout, t) else {
                    return Ok(None);
                };
                let own = layout.frame_columns(t);
                let mut grad = this.grad.columns(own);
                for s in 0..num_sequences {
                    if !matches!(self.source(layout, t, s), Source::Current(_)) {
                        grad.zero_columns(s..s + 1);
                    }
                }
                Ok(Some(ChildGradient {
                    index: 0,
                    columns: layout.frame_columns(src),
                    value: grad,
                }))
            }
            None => {
                let mut grad = Tensor::zeros(&[rows, layout.num_cols()]);
                for t in 0..layout.num_time_steps() {
                    for s in 0..num_sequences {
                        if let Source::Current(src) = self.source(layout, t, s) {
                            let j = layout.column_index(t, s);
                            grad.add_to_columns(src..src + 1, &this.grad.columns(j..j + 1));
                        }
                    }
                }
                Ok(Some(ChildGradient {
                    index: 0,
                    columns: 0..layout.num_cols(),
                    value: grad,
                }))
            }
        }
    }

    fn on_evaluate_end_iteration(&mut self, inputs: &[&NodeHandle]) {
        if self.direction != SteppingDirection::Forward {
            return;
        }
        let input = inputs[0];
        let Some(layout) = input.mb_layout() else {
            return;
        };
        let layout = layout.borrow();
        if input.cols() != layout.num_cols() {
            return;
        }
        let generation = layout.generation();
        if self.latest.as_ref().is_some_and(|latest| latest.generation != generation) {
            self.previous = self.latest.take();
        }
        self.latest = Some(CarryOver {
            value: input.value().clone(),
            num_time_steps: layout.num_time_steps(),
            num_parallel_sequences: layout.num_parallel_sequences(),
            generation,
        });
    }

    fn describe_params(&self) -> Option<String> {
        Some(format!(
            "time_step={}, initial={}",
            self.time_step, self.initial_activation
        ))
    }
}
