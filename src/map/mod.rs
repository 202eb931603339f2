//! 哈希表核心模块 - 分段锁映射及其组件

pub(crate) mod chain;
pub mod segment_map;

pub use segment_map::{SegmentMap, SegmentMapConfig, SegmentMapStats};

use once_cell::sync::Lazy;

/// 全局默认配置
pub static DEFAULT_CONFIG: Lazy<SegmentMapConfig> = Lazy::new(SegmentMapConfig::default);

/// 每个工作线程对应的段数
pub const SEGMENTS_PER_WORKER: usize = 7;
