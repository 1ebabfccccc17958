use std::time::Instant;

use log::debug;
use serde::Serialize;

use crate::embedding::Embedding;
use crate::error::{Error, Result};
use crate::index::{Identifier, Index};
use crate::provider::Context;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: Identifier,
    pub score: f32,
}

/// 使用文本在索引中搜索图片
///
/// 对所有记录做线性扫描，不使用近似索引。
pub struct SearchEngine<'a> {
    ctx: &'a Context,
}

impl<'a> SearchEngine<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// 将查询文本编码后对索引排序，返回前 `top_k` 个结果
    pub fn search(&self, query: &str, index: &Index, top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Ok(vec![]);
        }
        let start = Instant::now();
        let query = self.ctx.encode_text(query)?;
        debug!("编码查询耗时: {:.2}ms", start.elapsed().as_secs_f64() * 1000.);
        rank(&query, index, top_k)
    }
}

/// 计算索引中每条记录与查询向量的相似度，按分数从高到低返回前 `top_k` 个
///
/// 分数相同的记录保持索引中的顺序，分数为 NaN 的记录排在最后。
pub fn rank(query: &Embedding, index: &Index, top_k: usize) -> Result<Vec<SearchResult>> {
    if top_k == 0 {
        return Ok(vec![]);
    }
    if let Some(dim) = index.dim() {
        if dim != query.dim() {
            return Err(Error::DimensionMismatch { expected: dim, actual: query.dim() });
        }
    }

    let start = Instant::now();
    let mut results = index
        .iter()
        .map(|(id, embedding)| {
            Ok(SearchResult { id: id.clone(), score: embedding.similarity(query)? })
        })
        .collect::<Result<Vec<_>>>()?;
    // sort_by 是稳定排序，NaN 排在所有分数之后
    results.sort_by(|a, b| {
        a.score.is_nan().cmp(&b.score.is_nan()).then_with(|| b.score.total_cmp(&a.score))
    });
    results.truncate(top_k);

    debug!("排序 {} 条记录耗时: {:.2}ms", index.len(), start.elapsed().as_secs_f64() * 1000.);
    Ok(results)
}
