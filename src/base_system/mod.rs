//! 基础设施：配置文件与日志。

pub mod config;
pub mod context;
pub mod logging;
