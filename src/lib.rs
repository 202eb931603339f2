//! 高性能分段锁并发哈希表库
//!
//! 提供可在多工作线程间直接共享的键值映射与仅键集合。整表划分为若干段，
//! 每段一把互斥锁，不同段上的操作完全并行；重散列持有全部段锁并由
//! rayon 并行搬迁，负载因子越过阈值时自动触发。
//!
//! ## 主要特性
//! - 分段互斥锁，点操作仅持有一把段锁
//! - 并行重散列，嵌套并行区内触发亦可
//! - 素数桶容量规划，缓解低位分布差的哈希函数聚集
//! - 整表 apply / map_reduce 遍历，按工作线程分槽归约
//!
//! ## 快速开始
//!
//! ```rust
//! use segment_hashtable::SegmentMap;
//!
//! let map = SegmentMap::new();
//!
//! // 插入键值对
//! map.insert("key1", 1u64).expect("插入失败");
//!
//! // 查询
//! assert!(map.contains(&"key1"));
//! assert_eq!(map.get_or(&"key1", 0), 1);
//!
//! // 删除键
//! map.remove(&"key1");
//! assert!(!map.contains(&"key1"));
//! ```
//!
//! ## 并发契约
//!
//! 所有操作都以 `&self` 进行，容器可直接放入 `Arc` 或借给多个线程。
//! 传入的闭包会在持有段锁期间执行，闭包内不得回调同一容器实例，
//! 否则可能死锁。

#![warn(clippy::all)]

#[cfg(feature = "logging")]
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        log::debug!($($arg)*)
    };
}

#[cfg(feature = "logging")]
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        log::info!($($arg)*)
    };
}

#[cfg(feature = "logging")]
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        log::warn!($($arg)*)
    };
}

#[cfg(feature = "logging")]
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        log::error!($($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "logging"))]
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "logging"))]
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "logging"))]
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {};
}

// 核心模块导出
pub mod capacity;
pub mod error;
pub mod map;
pub mod parallel;
pub mod reduce;
pub mod set;
pub mod types;

use std::fmt;
use std::hash::BuildHasher;

// 公共接口导出
pub use crate::{
    capacity::CapacityPlanner,
    error::SegmentError,
    map::{SegmentMap, SegmentMapConfig, SegmentMapStats, DEFAULT_CONFIG, SEGMENTS_PER_WORKER},
    set::SegmentSet,
    types::{MapKey, MapValue},
};

// 简化默认类型别名
pub type DefaultMap = SegmentMap<String, String>;
pub type DefaultSet = SegmentSet<String>;

impl<K: MapKey, V: MapValue, S: BuildHasher> fmt::Debug for SegmentMap<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("SegmentMap")
            .field("n_keys", &stats.n_keys)
            .field("n_buckets", &stats.n_buckets)
            .field("load_factor", &stats.load_factor)
            .finish()
    }
}

impl<K: MapKey, S: BuildHasher> fmt::Debug for SegmentSet<K, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("SegmentSet")
            .field("n_keys", &stats.n_keys)
            .field("n_buckets", &stats.n_buckets)
            .field("load_factor", &stats.load_factor)
            .finish()
    }
}

// 便捷功能函数

/// 批量插入
///
/// 返回成功插入的条目数。
pub fn batch_insert<K: MapKey, V: MapValue>(
    map: &SegmentMap<K, V>,
    items: impl Iterator<Item = (K, V)>,
) -> usize {
    let mut count = 0;
    for (key, value) in items {
        if map.insert(key, value).is_ok() {
            count += 1;
        }
    }
    count
}

/// 批量查询
pub fn batch_get<'a, K: MapKey + 'a, V: MapValue + Clone>(
    map: &SegmentMap<K, V>,
    keys: impl Iterator<Item = &'a K>,
) -> Vec<Option<V>> {
    keys.map(|key| map.get(key)).collect()
}
