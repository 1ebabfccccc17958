use std::io::Write;

use anyhow::Result;
use clap::Parser;
use log::warn;
use tokio::task::block_in_place;

use crate::cache::EmbeddingCache;
use crate::cli::{SubCommandExtend, create_context};
use crate::config::{Opts, OutputFormat, PreprocessOptions, ProviderOptions, SearchOptions};
use crate::searcher::{SearchEngine, SearchResult};

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub provider: ProviderOptions,
    #[command(flatten)]
    pub preprocess: PreprocessOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 搜索的文本
    pub query: String,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let cache = EmbeddingCache::new(opts.conf_dir.cache());
        let index = match cache.load()? {
            Some(index) => index,
            None => {
                warn!("缓存不存在，请先使用 update 命令建立索引");
                Default::default()
            }
        };

        let ctx = create_context(&self.provider, &self.preprocess, &opts.conf_dir)?;
        let results = block_in_place(|| {
            SearchEngine::new(&ctx).search(&self.query, &index, self.search.count)
        })?;

        write_results(&mut std::io::stdout().lock(), &results, self.search.output_format)
    }
}

/// 输出搜索结果
pub fn write_results<W: Write>(
    output: &mut W,
    results: &[SearchResult],
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            writeln!(output, "{}", serde_json::to_string_pretty(results)?)?;
        }
        OutputFormat::Table => {
            for result in results {
                writeln!(output, "{:.4}\t{}", result.score, result.id)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results() -> Vec<SearchResult> {
        vec![
            SearchResult { id: "a.jpg".to_string(), score: 1.0 },
            SearchResult { id: "b.png".to_string(), score: 0.25 },
        ]
    }

    #[test]
    fn test_write_table() {
        let mut out = vec![];
        write_results(&mut out, &results(), OutputFormat::Table).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1.0000\ta.jpg\n0.2500\tb.png\n");
    }

    #[test]
    fn test_write_json() {
        let mut out = vec![];
        write_results(&mut out, &results(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[0]["id"], "a.jpg");
        assert_eq!(value[1]["score"], 0.25);
    }
}
