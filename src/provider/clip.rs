use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, info};
use ndarray::Array2;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Tensor as OrtTensor;
use tokenizers::{
    PaddingDirection, PaddingParams, PaddingStrategy, Tokenizer, TruncationDirection,
    TruncationParams, TruncationStrategy,
};

use super::{EmbeddingProvider, Tensor};
use crate::config::{ConfDir, ProviderOptions};
use crate::embedding::Embedding;
use crate::error::{Error, Result};

/// CLIP 文本编码器的固定上下文长度
const CONTEXT_LENGTH: usize = 77;

/// 基于 ONNX Runtime 的 CLIP 模型
///
/// 模型目录下需要有 `NAME_vision.onnx`、`NAME_text.onnx` 和 `NAME_tokenizer.json`。
/// 图像和文本编码器在第一次使用时才加载。
pub struct ClipProvider {
    vision_path: PathBuf,
    text_path: PathBuf,
    tokenizer_path: PathBuf,
    threads: usize,
    normalize: bool,
    vision: Mutex<Option<Session>>,
    text: Mutex<Option<Session>>,
    tokenizer: Mutex<Option<Tokenizer>>,
}

impl ClipProvider {
    pub fn new(model_dir: &Path, model: &str, threads: usize, normalize: bool) -> Result<Self> {
        let provider = Self {
            vision_path: model_dir.join(format!("{model}_vision.onnx")),
            text_path: model_dir.join(format!("{model}_text.onnx")),
            tokenizer_path: model_dir.join(format!("{model}_tokenizer.json")),
            threads,
            normalize,
            vision: Mutex::new(None),
            text: Mutex::new(None),
            tokenizer: Mutex::new(None),
        };
        for path in [&provider.vision_path, &provider.text_path, &provider.tokenizer_path] {
            if !path.exists() {
                return Err(Error::provider(format!("模型文件不存在: {}", path.display())));
            }
        }
        Ok(provider)
    }

    pub fn from_options(opts: &ProviderOptions, conf_dir: &ConfDir) -> Result<Self> {
        Self::new(&opts.model_dir(conf_dir), &opts.model, opts.threads, opts.normalize)
    }

    fn load_session(&self, path: &Path) -> Result<Session> {
        debug!("加载模型: {}", path.display());
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(self.threads))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| Error::provider(format!("加载模型失败 {}: {}", path.display(), e)))?;
        info!("模型已加载: {}", path.display());
        Ok(session)
    }

    fn load_tokenizer(&self) -> Result<Tokenizer> {
        let mut tokenizer = Tokenizer::from_file(&self.tokenizer_path).map_err(Error::provider)?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::Fixed(CONTEXT_LENGTH),
            direction: PaddingDirection::Right,
            pad_to_multiple_of: None,
            pad_id: 0,
            pad_type_id: 0,
            pad_token: "<pad>".to_string(),
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: CONTEXT_LENGTH,
                strategy: TruncationStrategy::LongestFirst,
                stride: 0,
                direction: TruncationDirection::Right,
            }))
            .map_err(Error::provider)?;
        Ok(tokenizer)
    }

    fn tokenize(&self, text: &str) -> Result<(Vec<i64>, Vec<i64>)> {
        let mut guard = self.tokenizer.lock().map_err(|_| Error::provider("tokenizer 锁已失效"))?;
        if guard.is_none() {
            *guard = Some(self.load_tokenizer()?);
        }
        let tokenizer = guard.as_ref().ok_or_else(|| Error::provider("tokenizer 未加载"))?;
        let encoding = tokenizer.encode(text, true).map_err(Error::provider)?;
        let ids = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let mask = encoding.get_attention_mask().iter().map(|&m| m as i64).collect();
        Ok((ids, mask))
    }

    /// 将模型输出转换为特征向量，输出形状为 `[N, D]` 或 `[D]`
    fn to_embedding(&self, shape: &[i64], data: &[f32]) -> Result<Embedding> {
        if data.iter().any(|v| !v.is_finite()) {
            return Err(Error::provider("模型输出包含非有限值"));
        }
        let dim = shape.last().copied().unwrap_or(0).max(0) as usize;
        if dim == 0 || data.len() % dim != 0 {
            return Err(Error::provider(format!("无法识别的输出形状: {:?}", shape)));
        }
        let rows = Array2::from_shape_vec((data.len() / dim, dim), data.to_vec())
            .map_err(Error::provider)?;
        let embedding = Embedding::new(rows).ok_or_else(|| Error::provider("模型输出为空"))?;
        Ok(if self.normalize { embedding.normalized() } else { embedding })
    }
}

impl EmbeddingProvider for ClipProvider {
    fn encode_image(&self, tensor: &Tensor) -> Result<Embedding> {
        let mut guard = self.vision.lock().map_err(|_| Error::provider("图像模型锁已失效"))?;
        if guard.is_none() {
            *guard = Some(self.load_session(&self.vision_path)?);
        }
        let session = guard.as_mut().ok_or_else(|| Error::provider("图像模型未加载"))?;

        let input_name =
            session.inputs.first().map(|i| i.name.clone()).unwrap_or_else(|| "pixel_values".into());
        let input = OrtTensor::from_array(tensor.clone()).map_err(Error::provider)?;
        let outputs =
            session.run(ort::inputs![input_name => input]).map_err(Error::provider)?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>().map_err(Error::provider)?;
        self.to_embedding(shape, data)
    }

    fn encode_text(&self, text: &str) -> Result<Embedding> {
        let (ids, mask) = self.tokenize(text)?;
        let len = ids.len();

        let mut guard = self.text.lock().map_err(|_| Error::provider("文本模型锁已失效"))?;
        if guard.is_none() {
            *guard = Some(self.load_session(&self.text_path)?);
        }
        let session = guard.as_mut().ok_or_else(|| Error::provider("文本模型未加载"))?;

        let names = session.inputs.iter().map(|i| i.name.clone()).collect::<Vec<_>>();
        let ids = OrtTensor::from_array(
            Array2::from_shape_vec((1, len), ids).map_err(Error::provider)?,
        )
        .map_err(Error::provider)?;
        let outputs = if names.len() >= 2 {
            let mask = OrtTensor::from_array(
                Array2::from_shape_vec((1, len), mask).map_err(Error::provider)?,
            )
            .map_err(Error::provider)?;
            session.run(ort::inputs![names[0].clone() => ids, names[1].clone() => mask])
        } else {
            let name = names.first().cloned().unwrap_or_else(|| "input_ids".to_string());
            session.run(ort::inputs![name => ids])
        }
        .map_err(Error::provider)?;

        let (shape, data) = outputs[0].try_extract_tensor::<f32>().map_err(Error::provider)?;
        self.to_embedding(shape, data)
    }
}
