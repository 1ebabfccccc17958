mod export;
mod interactive;
mod search;
mod show;
mod update;

pub use export::*;
pub use interactive::*;
pub use search::*;
pub use show::*;
pub use update::*;

use crate::config::{ConfDir, Opts, PreprocessOptions, ProviderOptions};
use crate::provider::Context;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// 根据命令行参数创建运行上下文
#[cfg(feature = "clip")]
pub fn create_context(
    provider: &ProviderOptions,
    preprocess: &PreprocessOptions,
    conf_dir: &ConfDir,
) -> anyhow::Result<Context> {
    use std::sync::Arc;

    use crate::provider::{ClipPreprocessor, ClipProvider};

    let model = ClipProvider::from_options(provider, conf_dir)?;
    Ok(Context::new(Arc::new(model), Arc::new(ClipPreprocessor::from(preprocess)))
        .with_timeout(provider.timeout()))
}

#[cfg(not(feature = "clip"))]
pub fn create_context(
    _provider: &ProviderOptions,
    _preprocess: &PreprocessOptions,
    _conf_dir: &ConfDir,
) -> anyhow::Result<Context> {
    Err(anyhow::anyhow!("当前版本未启用 clip 特性，无法加载模型，请使用 --features clip 重新编译"))
}
