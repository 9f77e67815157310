//! Strata 工具集
//!
//! 提供日志初始化以及 option 种子文件的解析。
//!
//! # OptionSeed
//! 启动时从 TOML 文件读取 `[options]` 表，在第一次创建 Level 之前写入 option 的 pending 值。

pub mod config;
pub mod init_log;
