use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// 特征向量，形状为 `行数 x 维度`
///
/// 普通的单个向量是 `1 x D`，多出的行用于一张图片对应多个向量（例如多个裁剪）的情况。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(Array2<f32>);

impl Embedding {
    /// 从矩阵创建，行数和维度都不能为 0
    pub fn new(rows: Array2<f32>) -> Option<Self> {
        if rows.nrows() == 0 || rows.ncols() == 0 {
            return None;
        }
        Some(Self(rows.as_standard_layout().into_owned()))
    }

    /// 从单个向量创建 `1 x D` 的特征
    pub fn from_vec(vector: Vec<f32>) -> Option<Self> {
        let dim = vector.len();
        Array2::from_shape_vec((1, dim), vector).ok().and_then(Self::new)
    }

    /// 向量维度 D
    pub fn dim(&self) -> usize {
        self.0.ncols()
    }

    /// 向量行数
    pub fn rows(&self) -> usize {
        self.0.nrows()
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.0.view()
    }

    pub fn into_inner(self) -> Array2<f32> {
        self.0
    }

    /// 计算两组向量的相似度
    ///
    /// 先求出两两点积组成的矩阵，再取平均值。两边都是单个向量时即为普通点积。
    pub fn similarity(&self, other: &Embedding) -> Result<f32> {
        if self.dim() != other.dim() {
            return Err(Error::DimensionMismatch { expected: self.dim(), actual: other.dim() });
        }
        let matrix = self.0.dot(&other.0.t());
        Ok(matrix.mean().unwrap_or_default())
    }

    /// 按位比较，用于确认复用的向量没有被改动
    pub fn bitwise_eq(&self, other: &Embedding) -> bool {
        self.0.shape() == other.0.shape()
            && self.0.iter().zip(other.0.iter()).all(|(a, b)| a.to_bits() == b.to_bits())
    }

    /// L2 归一化每一行
    pub fn normalized(mut self) -> Self {
        for mut row in self.0.rows_mut() {
            let norm = row.dot(&row).sqrt();
            if norm > f32::EPSILON {
                row.mapv_inplace(|v| v / norm);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_row_is_dot_product() {
        let a = Embedding::from_vec(vec![1., 2., 3.]).unwrap();
        let b = Embedding::from_vec(vec![4., 5., 6.]).unwrap();
        assert_eq!(a.similarity(&b).unwrap(), 32.);
    }

    #[test]
    fn test_multi_row_uses_mean() {
        // 两个裁剪对同一个查询：点积分别为 1 和 0
        let a = Embedding::new(array![[1., 0.], [0., 1.]]).unwrap();
        let q = Embedding::from_vec(vec![1., 0.]).unwrap();
        assert_eq!(a.similarity(&q).unwrap(), 0.5);

        // 2x2 对 2x2：[[1, 0], [0, 1]] 的平均值
        let b = Embedding::new(array![[1., 0.], [0., 1.]]).unwrap();
        assert_eq!(a.similarity(&b).unwrap(), 0.5);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = Embedding::from_vec(vec![1., 0.]).unwrap();
        let b = Embedding::from_vec(vec![1., 0., 0.]).unwrap();
        assert!(matches!(
            a.similarity(&b),
            Err(Error::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(Embedding::from_vec(vec![]).is_none());
        assert!(Embedding::new(Array2::zeros((0, 4))).is_none());
    }

    #[test]
    fn test_normalized() {
        let a = Embedding::from_vec(vec![3., 4.]).unwrap().normalized();
        assert_eq!(a.view(), array![[0.6, 0.8]]);
    }

    #[test]
    fn test_bitwise_eq() {
        let a = Embedding::from_vec(vec![0.0, 1.0]).unwrap();
        let b = Embedding::from_vec(vec![-0.0, 1.0]).unwrap();
        assert_eq!(a, b);
        assert!(!a.bitwise_eq(&b));
        assert!(a.bitwise_eq(&a.clone()));
    }
}
