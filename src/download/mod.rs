//! 分段媒体下载：分类、清单解析、并发抓取与装配。

pub mod downloader;
pub mod models;

pub(crate) mod assembler;
pub(crate) mod classify;
pub(crate) mod fetcher;
pub(crate) mod manifest;
pub(crate) mod progress;
pub(crate) mod range_url;
pub(crate) mod segment_pool;
