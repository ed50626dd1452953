//! 日志系统：stderr 控制台 + `logs/latest.log` 文件双输出。
//!
//! `latest.log` 在启动时超过上限、或进程退出时，会被打包成 `reader-<时间>.zip`。

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::{io, panic};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, info};
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use zip::CompressionMethod;
use zip::write::FileOptions;

const LATEST_LOG: &str = "latest.log";

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("subscriber init failed: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("time formatting failed: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Copy, Debug)]
pub struct LogOptions {
    pub debug: bool,
    pub use_color: bool,
    pub archive_on_exit: bool,
    /// false 时只写文件
    pub console: bool,
    /// 启动时 `latest.log` 达到该大小就先归档
    pub rotate_bytes: u64,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            debug: false,
            use_color: true,
            archive_on_exit: true,
            console: true,
            rotate_bytes: 10 * 1024 * 1024,
        }
    }
}

/// 日志目录与当前日志文件。
#[derive(Debug, Clone)]
struct LogFiles {
    dir: PathBuf,
    latest: PathBuf,
}

impl LogFiles {
    fn under(base_dir: Option<&Path>) -> Self {
        let dir = base_dir.unwrap_or_else(|| Path::new(".")).join("logs");
        let latest = dir.join(LATEST_LOG);
        Self { dir, latest }
    }

    fn rotate_if_oversized(&self, limit: u64) -> Result<Option<PathBuf>, LogError> {
        match fs::metadata(&self.latest) {
            Ok(meta) if meta.len() >= limit => self.archive(),
            _ => Ok(None),
        }
    }

    /// 空文件直接删除，不生成归档。
    fn archive(&self) -> Result<Option<PathBuf>, LogError> {
        let len = match fs::metadata(&self.latest) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if len == 0 {
            let _ = fs::remove_file(&self.latest);
            return Ok(None);
        }

        let stamp = OffsetDateTime::now_utc().format(format_description!(
            "[year][month][day]-[hour][minute][second]"
        ))?;
        let target = self.dir.join(format!("reader-{stamp}.zip"));

        {
            let mut zip = zip::ZipWriter::new(File::create(&target)?);
            let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
            zip.start_file(format!("reader-{stamp}.log"), options)?;
            io::copy(&mut File::open(&self.latest)?, &mut zip)?;
            zip.finish()?;
        }
        let _ = fs::remove_file(&self.latest);

        info!(target: "logging", archive = %target.display(), "log archived");
        Ok(Some(target))
    }
}

pub struct LogSystem {
    shutdown: Arc<Shutdown>,
}

impl LogSystem {
    pub fn init(options: LogOptions) -> Result<Self, LogError> {
        Self::init_with_base(options, None)
    }

    /// 日志目录为 `<base_dir>/logs`，未指定时使用当前目录。
    pub fn init_with_base(options: LogOptions, base_dir: Option<&Path>) -> Result<Self, LogError> {
        if tracing::dispatcher::has_been_set() {
            return Err(LogError::AlreadyInitialized);
        }

        let files = LogFiles::under(base_dir);
        fs::create_dir_all(&files.dir)?;
        files.rotate_if_oversized(options.rotate_bytes)?;

        let (file_writer, guard) = NonBlockingBuilder::default()
            .lossy(false)
            .finish(rolling::never(&files.dir, LATEST_LOG));

        tracing_subscriber::registry()
            .with(console_layer(&options))
            .with(file_layer(file_writer))
            .try_init()?;

        let shutdown = Arc::new(Shutdown {
            files,
            guard: Mutex::new(Some(guard)),
            done: AtomicBool::new(false),
            archive: options.archive_on_exit,
        });
        shutdown.on_ctrl_c();
        shutdown.on_panic();

        Ok(Self { shutdown })
    }

    pub fn logs_dir(&self) -> &Path {
        &self.shutdown.files.dir
    }

    pub fn safe_exit(&self) {
        self.shutdown.run();
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.shutdown.run();
    }
}

// stdout 留给命令输出，控制台日志走 stderr
fn console_layer(options: &LogOptions) -> impl Layer<Registry> + Send + Sync {
    let writer = if options.console {
        BoxMakeWriter::new(io::stderr)
    } else {
        BoxMakeWriter::new(io::sink)
    };
    let level = if options.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    fmt::layer()
        .with_target(options.debug)
        .with_ansi(options.use_color)
        .with_writer(writer)
        .with_filter(level)
}

fn file_layer<S>(writer: NonBlocking) -> impl Layer<S> + Send + Sync
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(LevelFilter::DEBUG)
}

/// 退出时只执行一次：刷新缓冲，再按需归档。
struct Shutdown {
    files: LogFiles,
    guard: Mutex<Option<WorkerGuard>>,
    done: AtomicBool,
    archive: bool,
}

impl Shutdown {
    fn on_ctrl_c(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let _ = ctrlc::set_handler(move || {
            this.run();
            std::process::exit(130);
        });
    }

    fn on_panic(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_default();
            error!(target: "panic", %location, "{info}");
            this.run();
            previous(info);
        }));
    }

    fn run(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        let guard = match self.guard.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        // guard 释放时 non_blocking 写线程把缓冲区刷盘
        drop(guard);

        if self.archive {
            if let Err(err) = self.files.archive() {
                eprintln!("failed to archive log: {err}");
            }
        }
    }
}
