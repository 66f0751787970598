//! 日志模块

use std::path::Path;
use anyhow::Result;
use log::LevelFilter;

/// 有日志文件时写入文件，否则写到 stderr
pub fn setup_logger(level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    let mut base_config = fern::Dispatch::new()
        .level(level)
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                message
            ))
        });

    base_config = match log_file {
        Some(file) => base_config.chain(fern::log_file(file)?),
        None => base_config.chain(std::io::stderr()),
    };

    base_config.apply()?;

    Ok(())
}
