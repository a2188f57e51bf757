/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 张量的基本运算（逐元素运算、矩阵乘法、激活函数）
 */

use super::Tensor;
use std::ops::{Add, Mul, Neg, Sub};

impl Tensor {
    /// 矩阵乘法。需要保证前一个张量的列数等于后一个张量的行数，否则会触发panic。
    pub fn mat_mul(&self, other: &Self) -> Self {
        assert_eq!(
            self.cols(),
            other.rows(),
            "前一个张量的列数必须等于后一个张量的行数"
        );
        Self::from_array(self.array().dot(other.array()))
    }

    pub fn transpose(&self) -> Self {
        Self::from_array(self.array().t().to_owned())
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self::from_array(self.array().mapv(f))
    }

    pub fn sigmoid(&self) -> Self {
        self.map(|x| 1.0 / (1.0 + (-x).exp()))
    }

    pub fn tanh(&self) -> Self {
        self.map(f32::tanh)
    }

    pub fn scale(&self, factor: f32) -> Self {
        self.map(|x| x * factor)
    }

    pub fn sum(&self) -> f32 {
        self.array().sum()
    }
}

impl Add for &Tensor {
    type Output = Tensor;

    fn add(self, rhs: &Tensor) -> Tensor {
        Tensor::from_array(self.array() + rhs.array())
    }
}

impl Sub for &Tensor {
    type Output = Tensor;

    fn sub(self, rhs: &Tensor) -> Tensor {
        Tensor::from_array(self.array() - rhs.array())
    }
}

/// 逐元素相乘（哈达玛积），矩阵乘法见[`Tensor::mat_mul`]
impl Mul for &Tensor {
    type Output = Tensor;

    fn mul(self, rhs: &Tensor) -> Tensor {
        Tensor::from_array(self.array() * rhs.array())
    }
}

impl Neg for &Tensor {
    type Output = Tensor;

    fn neg(self) -> Tensor {
        self.scale(-1.0)
    }
}
