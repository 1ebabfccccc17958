use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info};

use crate::embedding::Embedding;
use crate::error::{Error, Result};
use crate::index::{Identifier, Index};

const MAGIC: &[u8; 8] = b"CLIPIDX\0";
const VERSION: u32 = 1;
/// magic + version + dim + count + blake3
const HEADER_LEN: usize = 8 + 4 + 4 + 8 + 32;

/// 特征向量缓存文件
///
/// 文件格式（小端序）：
///
/// | 字段 | 长度 |
/// |---|---|
/// | magic | 8 |
/// | 版本号 | 4 |
/// | 向量维度，空索引为 0 | 4 |
/// | 记录数量 | 8 |
/// | 数据部分的 blake3 哈希 | 32 |
/// | bincode 编码的 `Vec<(String, Embedding)>` | 剩余部分 |
pub struct EmbeddingCache {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl EmbeddingCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp_path = path.clone().into_os_string();
        tmp_path.push(".tmp");
        Self { path, tmp_path: tmp_path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取缓存，如果从未写入过缓存则返回 `None`
    pub fn load(&self) -> Result<Option<Index>> {
        match self.read() {
            Ok(index) => Ok(Some(index)),
            Err(Error::CacheNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 读取缓存，不存在时返回空索引，损坏时仍然返回错误
    pub fn load_or_default(&self) -> Result<Index> {
        Ok(self.load()?.unwrap_or_default())
    }

    /// 读取缓存，文件不存在时返回 [`Error::CacheNotFound`]
    pub fn read(&self) -> Result<Index> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::CacheNotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        debug!("读取缓存 {}: {} 字节", self.path.display(), data.len());
        let index = decode(&data).map_err(|reason| Error::corrupt(&self.path, reason))?;
        info!("已加载 {} 条缓存记录", index.len());
        Ok(index)
    }

    /// 写入缓存，替换旧的内容
    ///
    /// 先完整写入临时文件，再通过重命名替换，中途崩溃不会破坏旧缓存。
    pub fn save(&self, index: &Index) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let result = self
            .write_tmp(index)
            .and_then(|_| fs::rename(&self.tmp_path, &self.path).map_err(Error::from));
        if result.is_err() {
            let _ = fs::remove_file(&self.tmp_path);
        }
        result?;

        info!("已保存 {} 条缓存记录到 {}", index.len(), self.path.display());
        Ok(())
    }

    fn write_tmp(&self, index: &Index) -> Result<()> {
        let file = File::create(&self.tmp_path)?;
        let mut writer = BufWriter::new(file);
        encode(index, &mut writer)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }
}

fn encode<W: Write>(index: &Index, writer: &mut W) -> Result<()> {
    let entries = index.iter().collect::<Vec<_>>();
    let payload = bincode::serialize(&entries).map_err(|e| io::Error::other(e.to_string()))?;
    let hash = blake3::hash(&payload);

    writer.write_all(MAGIC)?;
    writer.write_u32::<LittleEndian>(VERSION)?;
    writer.write_u32::<LittleEndian>(index.dim().unwrap_or(0) as u32)?;
    writer.write_u64::<LittleEndian>(entries.len() as u64)?;
    writer.write_all(hash.as_bytes())?;
    writer.write_all(&payload)?;
    Ok(())
}

fn decode(data: &[u8]) -> Result<Index, String> {
    if data.len() < HEADER_LEN {
        return Err(format!("文件头不完整: {} 字节", data.len()));
    }

    let mut reader = Cursor::new(data);
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic).map_err(|e| e.to_string())?;
    if &magic != MAGIC {
        return Err("不是特征向量缓存文件".to_string());
    }
    let version = reader.read_u32::<LittleEndian>().map_err(|e| e.to_string())?;
    if version != VERSION {
        return Err(format!("不支持的版本: {}", version));
    }
    let dim = reader.read_u32::<LittleEndian>().map_err(|e| e.to_string())? as usize;
    let count = reader.read_u64::<LittleEndian>().map_err(|e| e.to_string())? as usize;
    let mut hash = [0u8; 32];
    reader.read_exact(&mut hash).map_err(|e| e.to_string())?;

    let payload = &data[HEADER_LEN..];
    if blake3::hash(payload) != blake3::Hash::from_bytes(hash) {
        return Err("数据校验失败".to_string());
    }

    let entries: Vec<(Identifier, Embedding)> =
        bincode::deserialize(payload).map_err(|e| e.to_string())?;
    if entries.len() != count {
        return Err(format!("记录数量不一致: 文件头 {}，实际 {}", count, entries.len()));
    }

    let mut index = if dim == 0 { Index::new() } else { Index::with_dim(dim) };
    for (id, embedding) in entries {
        if embedding.rows() == 0 || embedding.dim() == 0 {
            return Err(format!("空向量: {}", id));
        }
        if index.contains(&id) {
            return Err(format!("重复的图片标识: {}", id));
        }
        index.insert(id, embedding).map_err(|e| e.to_string())?;
    }
    if dim == 0 && !index.is_empty() {
        return Err("文件头缺少向量维度".to_string());
    }

    Ok(index)
}
