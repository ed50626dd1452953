//! 交互层入口：命令行前端。

pub mod noui;
