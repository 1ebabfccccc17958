use anyhow::Result;
use clap::Parser;

use crate::cache::EmbeddingCache;
use crate::cli::SubCommandExtend;
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct ShowCommand {
    /// 同时列出所有图片标识
    #[arg(short, long)]
    pub list: bool,
}

impl SubCommandExtend for ShowCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let cache = EmbeddingCache::new(opts.conf_dir.cache());
        println!("缓存文件: {}", cache.path().display());

        let Some(index) = cache.load()? else {
            println!("缓存不存在");
            return Ok(());
        };
        println!("图片数量: {}", index.len());
        match index.dim() {
            Some(dim) => println!("向量维度: {}", dim),
            None => println!("向量维度: -"),
        }

        if self.list {
            for (id, embedding) in index.iter() {
                println!("{}\t{}", embedding.rows(), id);
            }
        }
        Ok(())
    }
}
