use std::io::{BufRead, Write};

use indicatif::ProgressStyle;

use crate::error::{Error, Result};

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .expect("invalid progress bar template")
        .progress_chars("#>-")
}

/// 解析结果数量，只接受非负整数
pub fn parse_top_k(s: &str) -> Result<usize> {
    s.trim().parse::<usize>().map_err(|_| Error::InvalidTopK(s.to_owned()))
}

/// 输出提示并读取一行，返回去除首尾空白的内容
///
/// 输入流结束时返回 `None`
pub fn read_line<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    prompt: &str,
) -> std::io::Result<Option<String>> {
    write!(output, "{}", prompt)?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_owned()))
}
