#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use clipsearch::{Context, Embedding, EmbeddingProvider, Error, ImagePreprocessor, Result, Tensor};
use ndarray::Array4;

/// 慢速图片的标记值，模型遇到它会睡眠一秒
pub const SLOW: f32 = 999.;

/// 把文件内容 "1,0,0" 解析为张量，内容以 "corrupt" 开头时失败
pub struct TextPreprocessor;

impl ImagePreprocessor for TextPreprocessor {
    fn preprocess(&self, path: &Path) -> Result<Tensor> {
        let text = fs::read_to_string(path)?;
        if text.starts_with("corrupt") {
            return Err(Error::ImagePreprocessing {
                path: path.to_path_buf(),
                reason: "corrupt image".to_string(),
            });
        }
        let values = parse(&text);
        let n = values.len();
        Ok(Array4::from_shape_vec((1, 1, 1, n), values).unwrap())
    }
}

/// 直接把张量展开为向量，并记录调用次数
///
/// 和真实模型一样，图片编码期间一直持有锁。
#[derive(Default)]
pub struct EchoProvider {
    pub image_calls: AtomicUsize,
    pub text_calls: AtomicUsize,
    session: Mutex<()>,
}

impl EchoProvider {
    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider for EchoProvider {
    fn encode_image(&self, tensor: &Tensor) -> Result<Embedding> {
        let _session = self.session.lock().unwrap();
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        let values = tensor.iter().copied().collect::<Vec<_>>();
        if values.first() == Some(&SLOW) {
            thread::sleep(Duration::from_secs(1));
        }
        Embedding::from_vec(values).ok_or_else(|| Error::Provider("empty image".to_string()))
    }

    fn encode_text(&self, text: &str) -> Result<Embedding> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        if text == "fail" {
            return Err(Error::Provider("text encoder offline".to_string()));
        }
        Embedding::from_vec(parse(text)).ok_or_else(|| Error::Provider("empty query".to_string()))
    }
}

fn parse(text: &str) -> Vec<f32> {
    text.trim().split(',').filter_map(|v| v.trim().parse().ok()).collect()
}

pub fn context() -> (Context, Arc<EchoProvider>) {
    let provider = Arc::new(EchoProvider::default());
    let ctx = Context::new(provider.clone(), Arc::new(TextPreprocessor));
    (ctx, provider)
}

/// 写入一张“图片”，内容为向量的文本形式
pub fn write_image(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}
