use indexmap::IndexMap;

use crate::embedding::Embedding;
use crate::error::{Error, Result};

/// 图片的唯一标识，由文件路径得到
pub type Identifier = String;

/// 索引中的一条记录
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: Identifier,
    pub embedding: Embedding,
}

/// 图片标识到特征向量的映射
///
/// 遍历顺序即插入顺序，搜索时分数相同的结果按这个顺序排列。
/// 索引中所有向量的维度相同，第一条记录决定维度。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Index {
    dim: Option<usize>,
    entries: IndexMap<Identifier, Embedding>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建一个已固定维度的空索引
    pub fn with_dim(dim: usize) -> Self {
        Self { dim: Some(dim), entries: IndexMap::new() }
    }

    /// 从记录列表创建索引，维度不一致时返回错误
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Identifier, Embedding)>,
    {
        let mut index = Self::new();
        for (id, embedding) in entries {
            index.insert(id, embedding)?;
        }
        Ok(index)
    }

    /// 向量维度，空索引返回 None
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Embedding> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// 插入一条记录，标识已存在时整体替换
    pub fn insert(&mut self, id: Identifier, embedding: Embedding) -> Result<()> {
        match self.dim {
            Some(dim) if dim != embedding.dim() => {
                return Err(Error::DimensionMismatch { expected: dim, actual: embedding.dim() });
            }
            Some(_) => {}
            None => self.dim = Some(embedding.dim()),
        }
        self.entries.insert(id, embedding);
        Ok(())
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&Identifier, &Embedding)> + '_ {
        self.entries.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &Identifier> + '_ {
        self.entries.keys()
    }

    pub fn into_entries(self) -> impl Iterator<Item = IndexEntry> {
        self.entries.into_iter().map(|(id, embedding)| IndexEntry { id, embedding })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(v: &[f32]) -> Embedding {
        Embedding::from_vec(v.to_vec()).unwrap()
    }

    #[test]
    fn test_first_entry_fixes_dim() {
        let mut index = Index::new();
        assert_eq!(index.dim(), None);
        index.insert("a".into(), emb(&[1., 0.])).unwrap();
        assert_eq!(index.dim(), Some(2));
        let err = index.insert("b".into(), emb(&[1., 0., 0.])).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_with_dim() {
        let mut index = Index::with_dim(3);
        assert!(index.insert("a".into(), emb(&[1., 0.])).is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn test_insertion_order() {
        let index = Index::from_entries([
            ("c".to_string(), emb(&[0.])),
            ("a".to_string(), emb(&[1.])),
            ("b".to_string(), emb(&[2.])),
        ])
        .unwrap();
        assert_eq!(index.ids().collect::<Vec<_>>(), ["c", "a", "b"]);
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut index =
            Index::from_entries([("a".to_string(), emb(&[1.])), ("b".to_string(), emb(&[2.]))])
                .unwrap();
        index.insert("a".into(), emb(&[3.])).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.ids().next().unwrap(), "a");
        assert_eq!(index.get("a"), Some(&emb(&[3.])));
    }
}
