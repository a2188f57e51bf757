/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 二阶张量（矩阵），供计算网络中各节点存放函数值与梯度值
 */

use ndarray::Array2;
use rand::Rng;
use rand::distributions::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

mod columns;
mod ops;
mod print;


/// 定义张量的结构体。本crate中的张量固定为2阶：`rows × cols`。
/// 对带有小批量布局（MBLayout）的节点而言，第`j`列对应`(t, s)`，其中`j = t * S + s`。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Tensor {
    data: Array2<f32>,
}

/// 将`&[rows, cols]`形式的形状拆成二元组（形状必须恰好为2阶）
fn dims_of(shape: &[usize]) -> (usize, usize) {
    assert!(
        shape.len() == 2,
        "张量的形状必须为2阶，实际得到{shape:?}"
    );
    (shape[0], shape[1])
}

impl Tensor {
    /// 按行优先顺序由`data`创建形状为`shape`（`[rows, cols]`）的张量。
    /// 注：`data`的长度必须和`shape`中所有元素的乘积相等，否则会panic。
    pub fn new(data: &[f32], shape: &[usize]) -> Self {
        let (rows, cols) = dims_of(shape);
        assert_eq!(
            data.len(),
            rows * cols,
            "数据长度{}与形状{shape:?}不符",
            data.len()
        );
        Self {
            data: Array2::from_shape_fn((rows, cols), |(i, j)| data[i * cols + j]),
        }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        let (rows, cols) = dims_of(shape);
        Self {
            data: Array2::zeros((rows, cols)),
        }
    }

    pub fn ones(shape: &[usize]) -> Self {
        Self::filled(1.0, shape)
    }

    /// 创建所有元素都为`value`的张量
    pub fn filled(value: f32, shape: &[usize]) -> Self {
        let (rows, cols) = dims_of(shape);
        Self {
            data: Array2::from_elem((rows, cols), value),
        }
    }

    /// 创建一个随机张量，其值在[-scale, scale]的闭区间内均匀分布
    pub fn new_uniform<R: Rng + ?Sized>(scale: f32, shape: &[usize], rng: &mut R) -> Self {
        let (rows, cols) = dims_of(shape);
        let dist = Uniform::from(-scale..=scale);
        Self {
            data: Array2::from_shape_fn((rows, cols), |_| dist.sample(rng)),
        }
    }

    pub(crate) const fn from_array(data: Array2<f32>) -> Self {
        Self { data }
    }

    pub(crate) const fn array(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// `(rows, cols)`
    pub fn dims(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 若为`1×1`张量，则返回其唯一的元素
    pub fn number(&self) -> Option<f32> {
        if self.dims() == (1, 1) {
            Some(self.data[[0, 0]])
        } else {
            None
        }
    }

    /// 按行优先顺序返回所有元素
    pub fn data_as_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    /// 调整形状；形状有变化时内容被清零，否则保持不变
    pub fn resize(&mut self, rows: usize, cols: usize) {
        if self.dims() != (rows, cols) {
            self.data = Array2::zeros((rows, cols));
        }
    }

    /// 用`other`覆盖本张量（形状随之改变）
    pub fn set_value(&mut self, other: &Self) {
        self.data.clone_from(&other.data);
    }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    pub fn has_nan(&self) -> bool {
        self.data.iter().any(|x| x.is_nan())
    }
}

impl std::ops::Index<[usize; 2]> for Tensor {
    type Output = f32;

    fn index(&self, index: [usize; 2]) -> &f32 {
        &self.data[index]
    }
}

impl std::ops::IndexMut<[usize; 2]> for Tensor {
    fn index_mut(&mut self, index: [usize; 2]) -> &mut f32 {
        &mut self.data[index]
    }
}
