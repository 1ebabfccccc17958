use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use clap::Parser;
use log::info;
use ndarray::prelude::*;
use ndarray_npy::write_npy;

use crate::cache::EmbeddingCache;
use crate::cli::SubCommandExtend;
use crate::index::Index;
use crate::Opts;

#[derive(Parser, Debug, Clone)]
pub struct ExportCommand {
    /// 输出的 npy 文件，图片标识会写入同名的 .txt 文件
    #[arg(short, long, default_value = "embeddings.npy")]
    pub output: PathBuf,
}

impl SubCommandExtend for ExportCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let cache = EmbeddingCache::new(opts.conf_dir.cache());
        let index = cache.load()?.ok_or_else(|| anyhow!("缓存不存在: {}", cache.path().display()))?;
        export_index(&index, &self.output)?;
        info!("导出成功: {}", self.output.display());
        Ok(())
    }
}

/// 将所有向量按行堆叠后写入 npy 文件，每一行对应的图片标识写入 .txt 文件
pub fn export_index(index: &Index, output: &Path) -> Result<()> {
    let mut arr = Array2::<f32>::zeros((0, index.dim().unwrap_or(0)));
    let mut ids = BufWriter::new(File::create(output.with_extension("txt"))?);
    for (id, embedding) in index.iter() {
        for row in embedding.view().rows() {
            arr.push(Axis(0), row)?;
            writeln!(ids, "{}", id)?;
        }
    }
    ids.flush()?;
    write_npy(output, &arr)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use ndarray_npy::read_npy;
    use tempfile::TempDir;

    use super::*;
    use crate::embedding::Embedding;

    #[test]
    fn test_export_stacks_rows() {
        let dir = TempDir::new().unwrap();
        let index = Index::from_entries([
            ("a".to_string(), Embedding::from_vec(vec![1., 2.]).unwrap()),
            ("b".to_string(), Embedding::new(array![[3., 4.], [5., 6.]]).unwrap()),
        ])
        .unwrap();

        let output = dir.path().join("out.npy");
        export_index(&index, &output).unwrap();

        let arr: Array2<f32> = read_npy(&output).unwrap();
        assert_eq!(arr, array![[1., 2.], [3., 4.], [5., 6.]]);
        let ids = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(ids, "a\nb\nb\n");
    }
}
