//! novels-reader 命令行入口。
//!
//! 启动顺序：解析参数 → 初始化日志 → 读取 `config.yml` → 组装存储/网络 → 执行子命令。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::debug;

use novels_reader::base_system::config::{load_or_create, load_or_create_with_base};
use novels_reader::base_system::context::Config;
use novels_reader::base_system::logging::{LogOptions, LogSystem};

mod ui;

use ui::noui::Command;

#[derive(Debug, Parser)]
#[command(name = "novels-reader", version)]
#[command(about = "Novel reader client: subscriptions, bookmarks, latest chapters, reading progress")]
struct Cli {
    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（存放 config.yml、logs 与本地存储文件）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 指定配置文件路径（优先于数据目录）
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.as_deref();
    let log = init_logging(cli.debug, data_dir)?;

    let config = load_config(cli.config.as_deref(), data_dir)?;
    debug!(target: "startup", api = %config.api_base_url, storage = %config.storage_path().display(), "config loaded");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let result = runtime.block_on(ui::noui::run(config, cli.command));

    log.safe_exit();
    result
}

fn load_config(config_path: Option<&Path>, data_dir: Option<&Path>) -> Result<Config> {
    let config = if config_path.is_some() || data_dir.is_some() {
        load_or_create_with_base::<Config>(config_path, data_dir)
    } else {
        load_or_create::<Config>(None)
    }
    .context("failed to load config.yml")?;
    Ok(config.with_base_dir(data_dir))
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        ..LogOptions::default()
    };
    LogSystem::init_with_base(opts, base_dir).map_err(|e| anyhow!(e))
}
