/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 小批量布局（MBLayout）、帧区间（FrameRange）与按方向的逐帧迭代
 *
 * 一个带布局的节点值为`rows × (T * S)`的矩阵，第`j = t * S + s`列存放
 * 第`s`条并行序列在第`t`个时间步的数据。
 */

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

/// 整个网络共享的小批量布局句柄（身份比较用`Rc::ptr_eq`）
pub type MbLayoutPtr = Rc<RefCell<MbLayout>>;

/// 单个`(t, s)`位置的标记
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFlags {
    /// 序列在此帧开始（`PastValue`在此处读初始值）
    pub sequence_start: bool,
    /// 序列在此帧结束（`FutureValue`在此处读初始值）
    pub sequence_end: bool,
    /// 此处没有数据（并行序列长短不一时的空隙）
    pub no_input: bool,
}

/// 小批量布局：`T`个时间步 × `S`条并行序列，外加每个位置的标记
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MbLayout {
    num_time_steps: usize,
    num_parallel_sequences: usize,
    flags: Vec<FrameFlags>,
    /// 每次`init`加1，用于区分新读入的小批量与对同一小批量的重复计算
    generation: u64,
}

impl MbLayout {
    /// 创建布局，所有序列都在第0帧开始、在最后一帧结束
    pub fn new(num_time_steps: usize, num_parallel_sequences: usize) -> Self {
        let mut layout = Self::default();
        layout.init(num_time_steps, num_parallel_sequences, true);
        layout
    }

    pub fn new_shared(num_time_steps: usize, num_parallel_sequences: usize) -> MbLayoutPtr {
        Rc::new(RefCell::new(Self::new(num_time_steps, num_parallel_sequences)))
    }

    /// 重新初始化布局。`fresh_sequences`为false时不设任何边界标记，
    /// 表示所有序列都是上一个小批量的延续。
    pub fn init(&mut self, num_time_steps: usize, num_parallel_sequences: usize, fresh_sequences: bool) {
        self.num_time_steps = num_time_steps;
        self.num_parallel_sequences = num_parallel_sequences;
        self.generation += 1;
        self.flags = vec![FrameFlags::default(); num_time_steps * num_parallel_sequences];
        if fresh_sequences && num_time_steps > 0 {
            for s in 0..num_parallel_sequences {
                self.set_sequence_start(s, 0);
                self.set_sequence_end(s, num_time_steps - 1);
            }
        }
    }

    pub const fn num_time_steps(&self) -> usize {
        self.num_time_steps
    }

    pub const fn num_parallel_sequences(&self) -> usize {
        self.num_parallel_sequences
    }

    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// 列数，即`T * S`
    pub const fn num_cols(&self) -> usize {
        self.num_time_steps * self.num_parallel_sequences
    }

    pub const fn is_empty(&self) -> bool {
        self.num_cols() == 0
    }

    pub const fn column_index(&self, t: usize, s: usize) -> usize {
        t * self.num_parallel_sequences + s
    }

    /// 第`t`帧所占的列区间
    pub const fn frame_columns(&self, t: usize) -> Range<usize> {
        let start = t * self.num_parallel_sequences;
        start..start + self.num_parallel_sequences
    }

    pub fn flags(&self, s: usize, t: usize) -> FrameFlags {
        self.flags[self.column_index(t, s)]
    }

    fn flags_mut(&mut self, s: usize, t: usize) -> &mut FrameFlags {
        let j = self.column_index(t, s);
        &mut self.flags[j]
    }

    pub fn set_sequence_start(&mut self, s: usize, t: usize) {
        self.flags_mut(s, t).sequence_start = true;
    }

    pub fn set_sequence_end(&mut self, s: usize, t: usize) {
        self.flags_mut(s, t).sequence_end = true;
    }

    /// 标记`(t, s)`处无数据
    pub fn set_gap(&mut self, s: usize, t: usize) {
        self.flags_mut(s, t).no_input = true;
    }

    pub fn is_sequence_start(&self, s: usize, t: usize) -> bool {
        self.flags(s, t).sequence_start
    }

    pub fn is_sequence_end(&self, s: usize, t: usize) -> bool {
        self.flags(s, t).sequence_end
    }

    pub fn is_gap(&self, s: usize, t: usize) -> bool {
        self.flags(s, t).no_input
    }

    /// 是否存在空隙；有空隙的节点需要做多序列处理（屏蔽无效列）
    pub fn has_gaps(&self) -> bool {
        self.flags.iter().any(|f| f.no_input)
    }

    /// 落在`columns`内且无数据的列
    pub fn gap_columns(&self, columns: Range<usize>) -> Vec<usize> {
        columns
            .filter(|&j| self.flags.get(j).is_some_and(|f| f.no_input))
            .collect()
    }
}

/// 选取节点值的列：整个小批量，或者某一个时间步
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FrameRange {
    AllFrames,
    Frame(usize),
}

impl FrameRange {
    pub const fn is_all_frames(&self) -> bool {
        matches!(self, Self::AllFrames)
    }

    pub const fn time_index(&self) -> Option<usize> {
        match self {
            Self::AllFrames => None,
            Self::Frame(t) => Some(*t),
        }
    }

    /// 本帧区间在一个共有`cols`列的值上对应的列区间。
    /// 没有布局的值与时间无关，总是返回全部列。
    pub fn column_range(&self, layout: Option<&MbLayout>, cols: usize) -> Range<usize> {
        match (self, layout) {
            (Self::Frame(t), Some(layout)) => layout.frame_columns(*t),
            _ => 0..cols,
        }
    }
}

/// 循环的步进方向：`PastValue`闭合的循环正向（+1），`FutureValue`闭合的循环反向（-1）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SteppingDirection {
    Forward,
    Backward,
}

impl SteppingDirection {
    pub const fn sign(&self) -> i32 {
        match self {
            Self::Forward => 1,
            Self::Backward => -1,
        }
    }
}

/// 按步进方向遍历布局中的所有帧；`.rev()`即为反向传播时的顺序
#[derive(Debug, Clone, Copy)]
pub struct FrameRangeIteration {
    num_time_steps: usize,
    direction: SteppingDirection,
}

impl FrameRangeIteration {
    pub const fn new(layout: &MbLayout, direction: SteppingDirection) -> Self {
        Self {
            num_time_steps: layout.num_time_steps(),
            direction,
        }
    }

    pub const fn iter(&self) -> FrameIter {
        FrameIter {
            front: 0,
            back: self.num_time_steps,
            num_time_steps: self.num_time_steps,
            direction: self.direction,
        }
    }
}

impl IntoIterator for FrameRangeIteration {
    type Item = FrameRange;
    type IntoIter = FrameIter;

    fn into_iter(self) -> FrameIter {
        self.iter()
    }
}

/// [`FrameRangeIteration`]的迭代器，`[front, back)`为尚未产出的步序号
#[derive(Debug, Clone)]
pub struct FrameIter {
    front: usize,
    back: usize,
    num_time_steps: usize,
    direction: SteppingDirection,
}

impl FrameIter {
    const fn frame_at(&self, step: usize) -> FrameRange {
        match self.direction {
            SteppingDirection::Forward => FrameRange::Frame(step),
            SteppingDirection::Backward => FrameRange::Frame(self.num_time_steps - 1 - step),
        }
    }
}

impl Iterator for FrameIter {
    type Item = FrameRange;

    fn next(&mut self) -> Option<FrameRange> {
        if self.front >= self.back {
            return None;
        }
        let frame = self.frame_at(self.front);
        self.front += 1;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back - self.front;
        (n, Some(n))
    }
}

impl DoubleEndedIterator for FrameIter {
    fn next_back(&mut self) -> Option<FrameRange> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some(self.frame_at(self.back))
    }
}

impl ExactSizeIterator for FrameIter {}
