#[cfg(feature = "clip")]
mod clip;
mod preprocess;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use ndarray::Array4;

#[cfg(feature = "clip")]
pub use self::clip::ClipProvider;
pub use self::preprocess::ClipPreprocessor;
use crate::embedding::Embedding;
use crate::error::{Error, Result};

/// 预处理后的图片，NCHW 格式
pub type Tensor = Array4<f32>;

/// 将图片文件解码并归一化为模型需要的输入
pub trait ImagePreprocessor: Send + Sync {
    fn preprocess(&self, path: &Path) -> Result<Tensor>;
}

/// 将图片或文本编码为特征向量
///
/// 同一个模型输出的向量维度必须一致。
pub trait EmbeddingProvider: Send + Sync {
    fn encode_image(&self, tensor: &Tensor) -> Result<Embedding>;

    fn encode_text(&self, text: &str) -> Result<Embedding>;
}

/// 程序启动时创建一次的运行上下文，持有模型和预处理器
#[derive(Clone)]
pub struct Context {
    provider: Arc<dyn EmbeddingProvider>,
    preprocessor: Arc<dyn ImagePreprocessor>,
    timeout: Option<Duration>,
    /// 同一时间只允许一个模型调用，超时的调用返回前后续调用不会开始计时
    gate: Arc<Mutex<()>>,
}

impl Context {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        preprocessor: Arc<dyn ImagePreprocessor>,
    ) -> Self {
        Self { provider, preprocessor, timeout: None, gate: Arc::new(Mutex::new(())) }
    }

    /// 设置单次模型调用的超时时间，`None` 表示不限制
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn preprocess(&self, path: &Path) -> Result<Tensor> {
        self.preprocessor.preprocess(path)
    }

    pub fn encode_image(&self, tensor: Tensor) -> Result<Embedding> {
        let provider = self.provider.clone();
        call_with_timeout(&self.gate, self.timeout, move || provider.encode_image(&tensor))
    }

    pub fn encode_text(&self, text: &str) -> Result<Embedding> {
        let provider = self.provider.clone();
        let text = text.to_owned();
        call_with_timeout(&self.gate, self.timeout, move || provider.encode_text(&text))
    }
}

/// 在单独的线程中执行模型调用，超时后不再等待结果
///
/// 模型线程持有 `gate` 直到模型返回。超时的线程无法被取消，会在后台继续运行，
/// 下一次调用要等它结束拿到 `gate` 后才开始计时。
fn call_with_timeout<T, F>(gate: &Arc<Mutex<()>>, timeout: Option<Duration>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let Some(timeout) = timeout else {
        let _guard = gate.lock().unwrap_or_else(|e| e.into_inner());
        return f();
    };

    let (started_tx, started_rx) = crossbeam_channel::bounded(1);
    let (tx, rx) = crossbeam_channel::bounded(1);
    let gate = gate.clone();
    thread::Builder::new().name("embedding".to_string()).spawn(move || {
        // 上一次调用 panic 时锁会被污染，这里不关心锁内的数据
        let _guard = gate.lock().unwrap_or_else(|e| e.into_inner());
        let _ = started_tx.send(());
        let _ = tx.send(f());
    })?;

    if started_rx.recv().is_err() {
        return Err(Error::provider("模型调用线程异常退出"));
    }
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(Error::ProviderTimeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(Error::provider("模型调用线程异常退出")),
    }
}
