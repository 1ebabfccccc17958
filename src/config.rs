use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;

use crate::cli::*;
use crate::utils::parse_top_k;

static CONF_DIR: LazyLock<String> = LazyLock::new(|| {
    ProjectDirs::from("", "", "clipsearch")
        .map(|dirs| dirs.config_dir().to_string_lossy().into_owned())
        .unwrap_or_else(|| ".clipsearch".to_string())
});

fn default_config_dir() -> &'static str {
    CONF_DIR.as_str()
}

#[derive(Parser, Debug, Clone)]
pub struct ProviderOptions {
    /// 模型文件目录，默认为配置目录下的 models
    #[arg(long, value_name = "DIR")]
    pub model_dir: Option<PathBuf>,
    /// 模型名称，对应 NAME_vision.onnx、NAME_text.onnx 和 NAME_tokenizer.json
    #[arg(short, long, value_name = "NAME", default_value = "RN50")]
    pub model: String,
    /// ONNX Runtime 推理线程数
    #[arg(long, value_name = "N", default_value_t = 4)]
    pub threads: usize,
    /// 对模型输出的向量做 L2 归一化
    #[arg(long)]
    pub normalize: bool,
    /// 单次模型调用的超时时间（秒），0 表示不限制
    #[arg(long, value_name = "SECONDS", default_value_t = 0)]
    pub timeout: u64,
}

impl ProviderOptions {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }

    pub fn model_dir(&self, conf_dir: &ConfDir) -> PathBuf {
        self.model_dir.clone().unwrap_or_else(|| conf_dir.models())
    }
}

#[derive(Parser, Debug, Clone)]
pub struct PreprocessOptions {
    /// 模型输入图片的边长
    #[arg(long, value_name = "SIZE", default_value_t = 224)]
    pub image_size: u32,
    /// 归一化使用的各通道均值
    #[arg(long, value_name = "R,G,B", default_value = "0.5,0.5,0.5", value_parser = parse_triple)]
    pub mean: [f32; 3],
    /// 归一化使用的各通道标准差
    #[arg(long, value_name = "R,G,B", default_value = "0.5,0.5,0.5", value_parser = parse_triple)]
    pub std: [f32; 3],
}

#[derive(Parser, Debug, Clone)]
pub struct BuildOptions {
    /// 扫描的文件后缀名，多个后缀用逗号分隔，不区分大小写
    #[arg(short, long, default_value = "jpg,jpeg,png")]
    pub suffix: String,
    /// 递归扫描子目录
    #[arg(short, long)]
    pub recursive: bool,
    /// 每批并行预处理的图片数量
    #[arg(long, value_name = "SIZE", default_value_t = 32)]
    pub batch_size: usize,
    /// 忽略已有缓存，重新计算所有图片
    #[arg(long)]
    pub refresh: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            suffix: "jpg,jpeg,png".to_string(),
            recursive: false,
            batch_size: 32,
            refresh: false,
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 显示的结果数量
    #[arg(
        short = 'n',
        long,
        value_name = "COUNT",
        default_value = "10",
        value_parser = parse_top_k
    )]
    pub count: usize,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "clipsearch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// clipsearch 配置文件目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 扫描图片目录，更新特征向量缓存
    Update(UpdateCommand),
    /// 使用文本搜索图片
    Search(SearchCommand),
    /// 交互式地更新并搜索
    Interactive(InteractiveCommand),
    /// 导出所有特征向量为 npy 文件
    Export(ExportCommand),
    /// 显示缓存信息
    Show(ShowCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回特征向量缓存文件的路径
    pub fn cache(&self) -> PathBuf {
        self.path.join("embeddings.bin")
    }

    /// 返回默认的模型目录
    pub fn models(&self) -> PathBuf {
        self.path.join("models")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

fn parse_triple(s: &str) -> anyhow::Result<[f32; 3]> {
    let parts = s.split(',').map(|p| p.trim().parse::<f32>()).collect::<Result<Vec<_>, _>>()?;
    match parts[..] {
        [r, g, b] => Ok([r, g, b]),
        _ => Err(anyhow::anyhow!("需要 3 个以逗号分隔的数值: {}", s)),
    }
}
