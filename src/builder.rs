use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::time::Instant;

use indicatif::ProgressBar;
use log::{debug, info, warn};
use rayon::prelude::*;
use regex::Regex;
use walkdir::WalkDir;

use crate::cache::EmbeddingCache;
use crate::config::BuildOptions;
use crate::embedding::Embedding;
use crate::error::{Error, Result};
use crate::index::{Identifier, Index};
use crate::provider::Context;
use crate::utils::pb_style;

/// 一次重建的结果
#[derive(Debug)]
pub struct BuildReport {
    pub index: Index,
    /// 从旧索引中直接复用的数量
    pub reused: usize,
    /// 新计算的数量
    pub computed: usize,
    /// 文件已不存在而被丢弃的数量
    pub removed: usize,
    /// 处理失败被跳过的图片
    pub failed: Vec<(Identifier, Error)>,
}

/// 根据图片目录和旧索引构建新索引，只为新图片计算特征向量
pub struct IndexBuilder<'a> {
    ctx: &'a Context,
    re_suf: Regex,
    recursive: bool,
    batch_size: usize,
    refresh: bool,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(ctx: &'a Context, opts: &BuildOptions) -> Self {
        let suffix = opts
            .suffix
            .split(',')
            .map(|s| regex::escape(s.trim().trim_start_matches('.')))
            .collect::<Vec<_>>()
            .join("|");
        let re_suf = Regex::new(&format!("(?i)^({})$", suffix)).expect("failed to build regex");
        Self {
            ctx,
            re_suf,
            recursive: opts.recursive,
            batch_size: opts.batch_size.max(1),
            refresh: opts.refresh,
        }
    }

    /// 列出目录下所有支持的图片，结果去重并按路径排序
    ///
    /// 无法作为标识的路径和无法读取的目录会记录警告并跳过。
    pub fn scan(&self, folder: &Path) -> Result<Vec<Identifier>> {
        self.walk(folder).map(|(ids, _)| ids)
    }

    /// 扫描目录，同时返回扫描过程中被跳过的路径
    fn walk(&self, folder: &Path) -> Result<(Vec<Identifier>, Vec<(Identifier, Error)>)> {
        if !folder.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("图片目录不存在: {}", folder.display()),
            )
            .into());
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut entries = vec![];
        let mut skipped = vec![];
        for entry in WalkDir::new(folder).min_depth(1).max_depth(max_depth) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let id = e.path().unwrap_or(folder).to_string_lossy().into_owned();
                    warn!("无法读取 {}: {}", id, e);
                    skipped.push((id, Error::from(io::Error::from(e))));
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(ext) = path.extension() else {
                continue;
            };
            if !self.re_suf.is_match(&ext.to_string_lossy()) {
                continue;
            }
            // 标识需要能还原为原路径，非 UTF-8 的文件名无法做到
            match path.to_str() {
                Some(id) => entries.push(id.to_owned()),
                None => {
                    warn!("文件名不是合法的 UTF-8，跳过: {}", path.display());
                    skipped.push((
                        path.to_string_lossy().into_owned(),
                        Error::preprocessing(path, "文件名不是合法的 UTF-8"),
                    ));
                }
            }
        }
        entries.sort();
        entries.dedup();

        debug!("扫描完成，共 {} 张图片，跳过 {} 项", entries.len(), skipped.len());
        Ok((entries, skipped))
    }

    /// 构建新索引
    ///
    /// 旧索引中已有的图片直接复制其向量，其余图片经过预处理和模型计算后加入。
    /// 结果只包含当前目录中存在的图片。单张图片失败时记录并跳过，不会中断整个过程。
    pub fn build(&self, folder: &Path, previous: &Index) -> Result<BuildReport> {
        let start = Instant::now();
        let (ids, mut failed) = self.walk(folder)?;

        let new_ids = ids.iter().filter(|id| !previous.contains(id)).collect::<Vec<_>>();
        let reused = ids.len() - new_ids.len();
        let current = ids.iter().map(String::as_str).collect::<HashSet<_>>();
        let removed = previous.ids().filter(|id| !current.contains(id.as_str())).count();

        info!("共 {} 张图片，需要计算 {} 张", ids.len(), new_ids.len());

        let mut computed = self.compute(&new_ids, &mut failed);

        // 有复用的记录时，新索引沿用旧索引的维度
        let mut index = match previous.dim() {
            Some(dim) if reused > 0 => Index::with_dim(dim),
            _ => Index::new(),
        };
        for id in ids {
            let embedding = match previous.get(&id) {
                Some(embedding) => embedding.clone(),
                None => match computed.remove(&id) {
                    Some(embedding) => embedding,
                    None => continue,
                },
            };
            if let Err(e) = index.insert(id.clone(), embedding) {
                warn!("跳过 {}: {}", id, e);
                failed.push((id, e));
            }
        }

        let computed = index.len() - reused;
        info!(
            "构建完成：复用 {}，新增 {}，删除 {}，失败 {}，耗时 {:.2}s",
            reused,
            computed,
            removed,
            failed.len(),
            start.elapsed().as_secs_f32()
        );

        Ok(BuildReport { index, reused, computed, removed, failed })
    }

    /// 读取缓存、构建新索引并写回缓存
    ///
    /// `refresh` 模式下忽略旧缓存，所有图片都会重新计算。
    pub fn rebuild(&self, folder: &Path, cache: &EmbeddingCache) -> Result<BuildReport> {
        let previous = if self.refresh {
            info!("忽略已有缓存，重新计算所有图片");
            Index::new()
        } else {
            cache.load_or_default()?
        };
        let report = self.build(folder, &previous)?;
        cache.save(&report.index)?;
        Ok(report)
    }

    /// 分批计算特征向量，每批内并行预处理，模型调用逐张进行
    fn compute(
        &self,
        ids: &[&Identifier],
        failed: &mut Vec<(Identifier, Error)>,
    ) -> HashMap<Identifier, Embedding> {
        let pb = ProgressBar::new(ids.len() as u64).with_style(pb_style());
        let mut computed = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(self.batch_size) {
            let tensors = chunk
                .par_iter()
                .map(|id| self.ctx.preprocess(Path::new(id.as_str())))
                .collect::<Vec<_>>();

            for (&id, tensor) in chunk.iter().zip(tensors) {
                match tensor.and_then(|tensor| self.ctx.encode_image(tensor)) {
                    Ok(embedding) => {
                        pb.set_message(id.clone());
                        computed.insert(id.clone(), embedding);
                    }
                    Err(e) => {
                        pb.suspend(|| warn!("跳过 {}: {}", id, e));
                        failed.push((id.clone(), e));
                    }
                }
                pb.inc(1);
            }
        }

        pb.finish_and_clear();
        computed
    }
}
