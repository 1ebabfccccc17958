use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use tokio::task::block_in_place;

use crate::builder::IndexBuilder;
use crate::cache::EmbeddingCache;
use crate::cli::{SubCommandExtend, create_context};
use crate::config::{BuildOptions, Opts, PreprocessOptions, ProviderOptions};

#[derive(Parser, Debug, Clone)]
pub struct UpdateCommand {
    #[command(flatten)]
    pub provider: ProviderOptions,
    #[command(flatten)]
    pub preprocess: PreprocessOptions,
    #[command(flatten)]
    pub build: BuildOptions,
    /// 图片所在目录
    pub folder: PathBuf,
}

impl SubCommandExtend for UpdateCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let ctx = create_context(&self.provider, &self.preprocess, &opts.conf_dir)?;
        let cache = EmbeddingCache::new(opts.conf_dir.cache());

        info!("开始扫描目录: {}", self.folder.display());
        let report =
            block_in_place(|| IndexBuilder::new(&ctx, &self.build).rebuild(&self.folder, &cache))?;

        for (id, e) in &report.failed {
            warn!("处理失败 {}: {}", id, e);
        }
        println!(
            "共 {} 张图片：复用 {}，新增 {}，删除 {}，失败 {}",
            report.index.len(),
            report.reused,
            report.computed,
            report.removed,
            report.failed.len()
        );
        Ok(())
    }
}
