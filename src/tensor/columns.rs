/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 按列区间读写张量（对应一个或全部时间帧）
 */

use super::Tensor;
use ndarray::{Axis, s};
use std::ops::Range;

impl Tensor {
    /// 取出`range`范围内的列，返回新的张量
    pub fn columns(&self, range: Range<usize>) -> Self {
        Self::from_array(self.data.slice(s![.., range]).to_owned())
    }

    /// 用`src`覆盖`range`范围内的列（`src`的形状须为`rows × range.len()`）
    pub fn set_columns(&mut self, range: Range<usize>, src: &Self) {
        assert_eq!(
            (self.rows(), range.len()),
            src.dims(),
            "写入列区间{range:?}时形状不一致"
        );
        self.data.slice_mut(s![.., range]).assign(&src.data);
    }

    /// 将`src`累加到`range`范围内的列上
    pub fn add_to_columns(&mut self, range: Range<usize>, src: &Self) {
        assert_eq!(
            (self.rows(), range.len()),
            src.dims(),
            "累加列区间{range:?}时形状不一致"
        );
        let mut block = self.data.slice_mut(s![.., range]);
        block += &src.data;
    }

    pub fn zero_columns(&mut self, range: Range<usize>) {
        self.data.slice_mut(s![.., range]).fill(0.0);
    }

    /// 把单列张量横向复制`n`份；已是`n`列的张量原样返回
    pub fn broadcast_columns(&self, n: usize) -> Self {
        if self.cols() == n {
            return self.clone();
        }
        assert_eq!(self.cols(), 1, "只有单列张量才能按列广播");
        let mut out = Self::zeros(&[self.rows(), n]);
        for mut col in out.data.columns_mut() {
            col.assign(&self.data.column(0));
        }
        out
    }

    /// 按行求和，得到`rows × 1`的张量
    pub fn sum_columns(&self) -> Self {
        Self::from_array(self.data.sum_axis(Axis(1)).insert_axis(Axis(1)))
    }
}
