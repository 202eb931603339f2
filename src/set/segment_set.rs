//! 分段锁哈希集合
//!
//! 与映射同构，值类型取单元类型的退化形态。区别只在容量规划: 集合
//! 使用自己的素数表与放大因子，初始桶数也随之取 11。

use crate::{
    capacity::CapacityPlanner,
    error::SegmentError,
    map::{SegmentMap, SegmentMapConfig, SegmentMapStats},
    types::MapKey,
};
use ahash::RandomState;
use std::hash::BuildHasher;

/// 分段锁并发哈希集合
///
/// 所有操作以 `&self` 进行；传入的闭包在段锁下执行，不得回调同一
/// 实例。
pub struct SegmentSet<K, S = RandomState> {
    inner: SegmentMap<K, (), S>,
}

impl<K, S> SegmentSet<K, S> {
    /// 返回存活键数
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// 判断是否为空
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// 返回当前桶数
    pub fn bucket_count(&self) -> usize {
        self.inner.bucket_count()
    }

    /// 返回段数
    pub fn segment_count(&self) -> usize {
        self.inner.segment_count()
    }

    /// 返回当前负载因子
    pub fn load_factor(&self) -> f64 {
        self.inner.load_factor()
    }

    /// 返回自动扩容的负载因子阈值
    pub fn max_load_factor(&self) -> f64 {
        self.inner.max_load_factor()
    }

    /// 设置自动扩容的负载因子阈值，必须为正
    pub fn set_max_load_factor(&self, value: f64) {
        self.inner.set_max_load_factor(value);
    }

    /// 返回统计快照
    pub fn stats(&self) -> SegmentMapStats {
        self.inner.stats()
    }
}

impl<K: MapKey> SegmentSet<K, RandomState> {
    /// 创建默认配置的哈希集合
    pub fn new() -> Self {
        Self::with_config(SegmentMapConfig::default()).expect("默认配置恒为有效")
    }

    /// 从配置创建哈希集合
    pub fn with_config(config: SegmentMapConfig) -> Result<Self, SegmentError> {
        Self::with_config_and_hasher(config, RandomState::new())
    }
}

impl<K: MapKey> Default for SegmentSet<K, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: MapKey, S: BuildHasher + Send + Sync> SegmentSet<K, S> {
    /// 从配置与哈希器创建哈希集合
    pub fn with_config_and_hasher(config: SegmentMapConfig, hasher: S) -> Result<Self, SegmentError> {
        Ok(Self {
            inner: SegmentMap::from_parts(config, hasher, CapacityPlanner::for_set())?,
        })
    }

    /// 加入指定键；键已存在时什么都不做
    ///
    /// 新键落地后可能触发自动扩容，扩容目标超出容量规划范围时返回
    /// [`SegmentError::CapacityExceeded`]，此时键本身已写入。
    pub fn insert(&self, key: K) -> Result<(), SegmentError> {
        self.inner.insert(key, ())
    }

    /// 删除指定键；键不存在时什么都不做
    pub fn remove(&self, key: &K) {
        self.inner.remove(key);
    }

    /// 判断指定键是否存在
    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains(key)
    }

    /// 对全部键并行应用处理器
    ///
    /// 持有全部段锁，与一切点操作互斥。
    pub fn apply_all(&self, handler: impl Fn(&K) + Sync) {
        self.inner.apply_all(|key, _| handler(key));
    }

    /// 对全部键求映射并归约
    pub fn map_reduce<W>(
        &self,
        mapper: impl Fn(&K) -> W + Sync,
        reducer: impl Fn(&mut W, W) + Sync,
        default: W,
    ) -> W
    where
        W: Clone + Send,
    {
        self.inner.map_reduce(|key, _| mapper(key), reducer, default)
    }

    /// 预留桶数，使桶数不小于 `min_buckets`
    pub fn reserve(&self, min_buckets: usize) -> Result<(), SegmentError> {
        self.inner.reserve(min_buckets)
    }

    /// 清空全部键，桶数回落到初始素数
    pub fn clear(&self) {
        self.inner.clear();
    }
}
