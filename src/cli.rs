use std::path::PathBuf;
use clap::Parser;
use log::LevelFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Download a file over HTTP in concurrent ranges, resumable")]
pub struct CliArgs {
    /// 下载地址
    pub url: String,

    /// 保存的文件名，默认取 url 的最后一段
    #[arg(short = 'o', long)]
    pub file_name: Option<String>,

    /// 保存目录
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// 分块数量，小于 1 时使用默认值
    #[arg(short, long, allow_negative_numbers = true)]
    pub split: Option<i64>,

    /// JSON 配置文件
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 附加请求头，格式 `Name: value`，可重复
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// 每个分块的重试次数
    #[arg(short, long)]
    pub retry: Option<u8>,

    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[arg(long, default_value_t = LevelFilter::Info)]
    pub log_level: LevelFilter,

    #[arg(long)]
    pub no_progress: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_arguments() {
        let args = CliArgs::try_parse_from([
            "split-downloader",
            "https://oss.example.com/cool.mp4",
            "-s", "-1",
            "-d", "/tmp/dl",
            "-H", "Cookie: a=b",
            "-H", "Referer: https://oss.example.com/",
            "--log-level", "debug",
        ]).unwrap();

        assert_eq!(args.url, "https://oss.example.com/cool.mp4");
        assert_eq!(args.split, Some(-1));
        assert_eq!(args.dir, Some(PathBuf::from("/tmp/dl")));
        assert_eq!(args.headers.len(), 2);
        assert_eq!(args.log_level, LevelFilter::Debug);
        assert!(args.file_name.is_none());
        assert!(!args.no_progress);
    }

    #[test]
    fn should_require_url() {
        assert!(CliArgs::try_parse_from(["split-downloader"]).is_err());
    }
}
