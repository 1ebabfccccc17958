use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::warn;
use tokio::task::block_in_place;

use crate::builder::IndexBuilder;
use crate::cache::EmbeddingCache;
use crate::cli::{SubCommandExtend, create_context, write_results};
use crate::config::{BuildOptions, Opts, OutputFormat, PreprocessOptions, ProviderOptions};
use crate::index::Index;
use crate::provider::Context;
use crate::searcher::SearchEngine;
use crate::utils::{parse_top_k, read_line};

#[derive(Parser, Debug, Clone)]
pub struct InteractiveCommand {
    #[command(flatten)]
    pub provider: ProviderOptions,
    #[command(flatten)]
    pub preprocess: PreprocessOptions,
    #[command(flatten)]
    pub build: BuildOptions,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
    /// 图片所在目录
    pub folder: PathBuf,
}

impl SubCommandExtend for InteractiveCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let ctx = create_context(&self.provider, &self.preprocess, &opts.conf_dir)?;
        let session = Session {
            ctx: &ctx,
            cache: EmbeddingCache::new(opts.conf_dir.cache()),
            folder: self.folder.clone(),
            build: self.build.clone(),
            format: self.output_format,
        };
        block_in_place(|| session.run(&mut std::io::stdin().lock(), &mut std::io::stdout().lock()))
    }
}

/// 交互式会话：询问是否更新索引，然后循环读取结果数量和搜索文本
pub struct Session<'a> {
    pub ctx: &'a Context,
    pub cache: EmbeddingCache,
    pub folder: PathBuf,
    pub build: BuildOptions,
    pub format: OutputFormat,
}

impl Session<'_> {
    pub fn run<R: BufRead, W: Write>(&self, input: &mut R, output: &mut W) -> Result<()> {
        let Some(answer) = read_line(input, output, "是否更新索引？(y/N) ")? else {
            return Ok(());
        };
        let index = if answer.eq_ignore_ascii_case("y") {
            let report =
                IndexBuilder::new(self.ctx, &self.build).rebuild(&self.folder, &self.cache)?;
            writeln!(
                output,
                "索引已更新：复用 {}，新增 {}，删除 {}，失败 {}",
                report.reused,
                report.computed,
                report.removed,
                report.failed.len()
            )?;
            report.index
        } else {
            self.cache.load()?.unwrap_or_else(|| {
                warn!("缓存不存在，索引为空");
                Index::new()
            })
        };

        let engine = SearchEngine::new(self.ctx);
        loop {
            let Some(top_k) = self.read_top_k(input, output)? else {
                return Ok(());
            };
            let Some(query) = read_line(input, output, "请输入搜索内容（留空退出）: ")? else {
                return Ok(());
            };
            if query.is_empty() {
                return Ok(());
            }

            let results = engine.search(&query, &index, top_k)?;
            writeln!(output, "搜索结果:")?;
            write_results(output, &results, self.format)?;
        }
    }

    /// 读取结果数量，输入不合法时要求重新输入
    fn read_top_k<R: BufRead, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
    ) -> Result<Option<usize>> {
        loop {
            let Some(line) = read_line(input, output, "请输入需要显示的结果数量: ")? else {
                return Ok(None);
            };
            match parse_top_k(&line) {
                Ok(top_k) => return Ok(Some(top_k)),
                Err(e) => writeln!(output, "{}", e)?,
            }
        }
    }
}
