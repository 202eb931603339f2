//! 分段锁哈希表核心实现
//!
//! 桶数组按桶号划分成 `n_segments` 个段，每段一把互斥锁。点操作只锁
//! 自己的段；整表操作与重散列按下标顺序拿全部段锁。重散列期间另有一
//! 组副锁串行化对新桶数组的并行写入，主副两组锁互不重叠，不存在锁序
//! 环路。

use crate::{
    capacity::CapacityPlanner,
    error::SegmentError,
    map::chain::{self, BucketSlot, Link, Node},
    map::{DEFAULT_CONFIG, SEGMENTS_PER_WORKER},
    parallel,
    types::{MapKey, MapValue},
};
use ahash::RandomState;
use parking_lot::{Mutex, MutexGuard};
use std::{
    cell::UnsafeCell,
    hash::BuildHasher,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

/// 哈希表配置
#[derive(Clone, Debug)]
pub struct SegmentMapConfig {
    /// 初始桶数下限，0 表示使用内置初始素数
    pub initial_capacity: usize,
    /// 触发自动扩容的负载因子阈值，必须为正
    pub max_load_factor: f64,
}

impl Default for SegmentMapConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            max_load_factor: 1.0,
        }
    }
}

/// 哈希表统计快照
///
/// 各字段读取时不加锁，与并发写入者之间允许瞬时不一致。
#[derive(Clone, Debug, Default)]
pub struct SegmentMapStats {
    pub n_keys: usize,
    pub n_buckets: usize,
    pub n_segments: usize,
    pub load_factor: f64,
    pub max_load_factor: f64,
}

/// 按缓存行对齐的段锁，避免相邻锁互相失效
#[repr(align(64))]
struct PaddedLock(Mutex<()>);

fn new_lock_array(n_segments: usize) -> Box<[PaddedLock]> {
    (0..n_segments)
        .map(|_| PaddedLock(Mutex::new(())))
        .collect()
}

/// 分段锁并发哈希表
///
/// 键值对存放在链式桶中，同一时刻每个条目恰好属于一个桶。所有操作
/// 通过 `&self` 进行；传入的闭包在段锁下执行，不得回调同一实例。
pub struct SegmentMap<K, V, S = RandomState> {
    /// 桶数组，仅在持有全部主段锁时整体替换
    buckets: UnsafeCell<Vec<BucketSlot<K, V>>>,
    /// 当前桶数，点操作以双重检查方式读取
    n_buckets: AtomicUsize,
    /// 存活键数
    n_keys: AtomicUsize,
    /// 负载因子阈值的位模式
    max_load_factor: AtomicU64,
    n_workers: usize,
    n_segments: usize,
    segment_locks: Box<[PaddedLock]>,
    /// 重散列期间串行化新桶数组写入的副锁
    rehash_locks: Box<[PaddedLock]>,
    hasher: S,
    planner: CapacityPlanner,
    initial_buckets: usize,
}

// SAFETY: 桶数组只在锁协议下访问。点操作持有桶号对应的段锁并以双重
// 检查规避与重散列的竞争；整表操作与重散列持有全部主段锁；重散列对
// 新数组的写入由副锁串行化。节点可能被任意线程摘除或释放，故要求
// K/V: Send；共享读取要求 K/V: Sync。
unsafe impl<K: Send, V: Send, S: Send> Send for SegmentMap<K, V, S> {}
unsafe impl<K: Send + Sync, V: Send + Sync, S: Sync> Sync for SegmentMap<K, V, S> {}

impl<K, V, S> SegmentMap<K, V, S> {
    /// 返回存活键数
    pub fn len(&self) -> usize {
        self.n_keys.load(Ordering::Relaxed)
    }

    /// 判断是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 返回当前桶数
    pub fn bucket_count(&self) -> usize {
        self.n_buckets.load(Ordering::Relaxed)
    }

    /// 返回段数
    pub fn segment_count(&self) -> usize {
        self.n_segments
    }

    /// 返回当前负载因子，即键数与桶数之比
    pub fn load_factor(&self) -> f64 {
        self.len() as f64 / self.bucket_count() as f64
    }

    /// 返回自动扩容的负载因子阈值
    pub fn max_load_factor(&self) -> f64 {
        f64::from_bits(self.max_load_factor.load(Ordering::Relaxed))
    }

    /// 设置自动扩容的负载因子阈值，必须为正
    pub fn set_max_load_factor(&self, value: f64) {
        debug_assert!(value > 0.0, "负载因子阈值必须为正");
        self.max_load_factor.store(value.to_bits(), Ordering::Relaxed);
    }

    /// 返回统计快照
    pub fn stats(&self) -> SegmentMapStats {
        SegmentMapStats {
            n_keys: self.len(),
            n_buckets: self.bucket_count(),
            n_segments: self.n_segments,
            load_factor: self.load_factor(),
            max_load_factor: self.max_load_factor(),
        }
    }
}

impl<K: MapKey, V: MapValue> SegmentMap<K, V, RandomState> {
    /// 创建默认配置的哈希表
    pub fn new() -> Self {
        Self::with_config(DEFAULT_CONFIG.clone()).expect("默认配置恒为有效")
    }

    /// 从配置创建哈希表
    pub fn with_config(config: SegmentMapConfig) -> Result<Self, SegmentError> {
        Self::with_config_and_hasher(config, RandomState::new())
    }
}

impl<K: MapKey, V: MapValue> Default for SegmentMap<K, V, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: MapKey, V: MapValue, S: BuildHasher + Send + Sync> SegmentMap<K, V, S> {
    /// 从配置与哈希器创建哈希表
    pub fn with_config_and_hasher(config: SegmentMapConfig, hasher: S) -> Result<Self, SegmentError> {
        Self::from_parts(config, hasher, CapacityPlanner::for_map())
    }

    pub(crate) fn from_parts(
        config: SegmentMapConfig,
        hasher: S,
        planner: CapacityPlanner,
    ) -> Result<Self, SegmentError> {
        if !(config.max_load_factor > 0.0) {
            return Err(SegmentError::InvalidConfig {
                reason: "max_load_factor 必须为正".into(),
            });
        }
        let initial_buckets = planner.smallest();
        let n_buckets = if config.initial_capacity > initial_buckets {
            planner.plan(config.initial_capacity)?
        } else {
            initial_buckets
        };
        let n_workers = parallel::max_workers();
        let n_segments = n_workers * SEGMENTS_PER_WORKER;
        Ok(Self {
            buckets: UnsafeCell::new(chain::new_bucket_array(n_buckets)),
            n_buckets: AtomicUsize::new(n_buckets),
            n_keys: AtomicUsize::new(0),
            max_load_factor: AtomicU64::new(config.max_load_factor.to_bits()),
            n_workers,
            n_segments,
            segment_locks: new_lock_array(n_segments),
            rehash_locks: new_lock_array(n_segments),
            hasher,
            planner,
            initial_buckets,
        })
    }

    /// 设置指定键的值；键已存在时覆盖旧值
    ///
    /// 新键落地后可能触发自动扩容，扩容目标超出容量规划范围时返回
    /// [`SegmentError::CapacityExceeded`]，此时条目本身已写入。
    pub fn insert(&self, key: K, value: V) -> Result<(), SegmentError> {
        self.node_update(key, |key, slot| match slot {
            Some(node) => node.value = value,
            None => {
                *slot = Some(Box::new(Node::new(key, value)));
                self.n_keys.fetch_add(1, Ordering::Relaxed);
            }
        });
        self.grow_if_needed()
    }

    /// 用修改器更新指定键的值；键不存在时先以默认值构造再应用修改器
    pub fn upsert(&self, key: K, mutator: impl FnOnce(&mut V)) -> Result<(), SegmentError>
    where
        V: Default,
    {
        self.upsert_with(key, mutator, V::default())
    }

    /// 用修改器更新指定键的值；键不存在时先写入 `default` 再应用修改器
    pub fn upsert_with(
        &self,
        key: K,
        mutator: impl FnOnce(&mut V),
        default: V,
    ) -> Result<(), SegmentError> {
        self.node_update(key, |key, slot| match slot {
            Some(node) => mutator(&mut node.value),
            None => {
                // 先挂链再运行修改器，修改器失败时链与计数仍一致
                let node = slot.insert(Box::new(Node::new(key, default)));
                self.n_keys.fetch_add(1, Ordering::Relaxed);
                mutator(&mut node.value);
            }
        });
        self.grow_if_needed()
    }

    /// 删除指定键；键不存在时什么都不做
    pub fn remove(&self, key: &K) {
        self.node_apply(key, |slot| {
            if let Some(mut node) = slot.take() {
                *slot = node.next.take();
                self.n_keys.fetch_sub(1, Ordering::Relaxed);
            }
        });
    }

    /// 判断指定键是否存在
    pub fn contains(&self, key: &K) -> bool {
        self.node_apply(key, |slot| slot.is_some())
    }

    /// 返回指定键对应值的拷贝；键不存在时返回 `default`
    pub fn get_or(&self, key: &K, default: V) -> V
    where
        V: Clone,
    {
        self.node_apply(key, |slot| match slot {
            Some(node) => node.value.clone(),
            None => default,
        })
    }

    /// 返回指定键对应值的拷贝
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.node_apply(key, |slot| slot.as_ref().map(|node| node.value.clone()))
    }

    /// 对指定键的值求映射；键不存在时返回 `default`
    pub fn map_one<W>(&self, key: &K, mapper: impl FnOnce(&V) -> W, default: W) -> W {
        self.node_apply(key, |slot| match slot {
            Some(node) => mapper(&node.value),
            None => default,
        })
    }

    /// 对指定键的值应用处理器，键不存在时什么都不做
    pub fn apply_one(&self, key: &K, handler: impl FnOnce(&V)) {
        self.node_apply(key, |slot| {
            if let Some(node) = slot {
                handler(&node.value);
            }
        });
    }

    /// 对全部条目并行应用处理器
    ///
    /// 持有全部段锁，与一切点操作互斥。
    pub fn apply_all(&self, handler: impl Fn(&K, &V) + Sync) {
        self.node_apply_all(|node| handler(&node.key, &node.value));
    }

    /// 对全部条目求映射并归约
    ///
    /// 每个工作线程维护一个以 `default` 初始化的私有累积槽，遍历结束
    /// 后再把各槽串行合并，热路径上没有共享归约点。
    pub fn map_reduce<W>(
        &self,
        mapper: impl Fn(&K, &V) -> W + Sync,
        reducer: impl Fn(&mut W, W) + Sync,
        default: W,
    ) -> W
    where
        W: Clone + Send,
    {
        // 末位多留一槽，给不属于线程池的参与线程
        let accumulators: Vec<Mutex<W>> = (0..=self.n_workers)
            .map(|_| Mutex::new(default.clone()))
            .collect();
        self.node_apply_all(|node| {
            let mapped = mapper(&node.key, &node.value);
            let worker = match parallel::worker_id() {
                Some(id) if id < self.n_workers => id,
                _ => self.n_workers,
            };
            let mut slot = accumulators[worker].lock();
            reducer(&mut *slot, mapped);
        });
        let mut reduced = default;
        for accumulator in accumulators {
            reducer(&mut reduced, accumulator.into_inner());
        }
        reduced
    }

    /// 预留桶数，使桶数不小于 `min_buckets`
    ///
    /// 桶数只增不减；请求不超过当前桶数时为空操作。
    pub fn reserve(&self, min_buckets: usize) -> Result<(), SegmentError> {
        let target = self.planner.plan(min_buckets).map_err(|err| {
            log_error!("容量规划失败: 请求 {} 桶", min_buckets);
            err
        })?;
        let _guards = self.lock_all_segments();
        let current = self.n_buckets.load(Ordering::Acquire);
        if target <= current {
            return Ok(());
        }
        log_debug!("开始重散列: {} -> {} 桶", current, target);
        self.rehash_into(target);
        log_info!(
            "重散列完成: {} 桶, {} 键",
            target,
            self.n_keys.load(Ordering::Relaxed)
        );
        Ok(())
    }

    /// 清空全部条目，桶数回落到初始素数
    ///
    /// 这是唯一会缩小桶数的操作。
    pub fn clear(&self) {
        let _guards = self.lock_all_segments();
        // SAFETY: 持有全部主段锁，没有其他线程持有桶数组引用。
        let buckets = unsafe { &mut *self.buckets.get() };
        *buckets = chain::new_bucket_array(self.initial_buckets);
        self.n_buckets.store(self.initial_buckets, Ordering::Release);
        self.n_keys.store(0, Ordering::Release);
        log_debug!("清空完成: 桶数回落到 {}", self.initial_buckets);
    }

    /// 点访问引擎，键以引用传入
    ///
    /// 在正确的段锁下定位键所在槽位并交给处理器。拿到段锁后若发现桶
    /// 数已变，说明并发重散列替换了桶数组，此前算出的桶号作废，必须
    /// 重新定位；缺了这步检查就可能改错桶。
    fn node_apply<R>(&self, key: &K, handler: impl FnOnce(&mut Link<K, V>) -> R) -> R {
        let hash = self.hasher.hash_one(key);
        loop {
            let snapshot = self.n_buckets.load(Ordering::Acquire);
            let bucket_id = (hash % snapshot as u64) as usize;
            let _guard = self.segment_locks[bucket_id % self.n_segments].0.lock();
            if self.n_buckets.load(Ordering::Acquire) != snapshot {
                continue;
            }
            // SAFETY: 持有该桶所在段的锁，且桶数组自快照以来未被替换。
            let buckets = unsafe { &*self.buckets.get() };
            let slot = unsafe { &mut *buckets[bucket_id].head.get() };
            return handler(chain::locate(slot, key));
        }
    }

    /// 点访问引擎，键所有权交给处理器，供插入路径使用
    fn node_update<R>(&self, key: K, handler: impl FnOnce(K, &mut Link<K, V>) -> R) -> R {
        let hash = self.hasher.hash_one(&key);
        loop {
            let snapshot = self.n_buckets.load(Ordering::Acquire);
            let bucket_id = (hash % snapshot as u64) as usize;
            let _guard = self.segment_locks[bucket_id % self.n_segments].0.lock();
            if self.n_buckets.load(Ordering::Acquire) != snapshot {
                continue;
            }
            // SAFETY: 同 node_apply。
            let buckets = unsafe { &*self.buckets.get() };
            let slot = unsafe { &mut *buckets[bucket_id].head.get() };
            let slot = chain::locate(slot, &key);
            return handler(key, slot);
        }
    }

    /// 整表遍历引擎
    ///
    /// 按下标顺序拿全部段锁，再并行遍历每个桶链。
    fn node_apply_all(&self, handler: impl Fn(&Node<K, V>) + Sync) {
        let _guards = self.lock_all_segments();
        // SAFETY: 持有全部主段锁，桶数组不会被替换；遍历只作共享读取。
        let buckets = unsafe { &*self.buckets.get() };
        parallel::parallel_for(buckets.len(), |bucket_id| {
            let mut node = unsafe { &*buckets[bucket_id].head.get() }.as_deref();
            while let Some(current) = node {
                handler(current);
                node = current.next.as_deref();
            }
        });
    }

    /// 负载因子越过阈值时扩容
    ///
    /// 阈值判断读取的计数允许轻微滞后，随后的重散列会在全部段锁下
    /// 看到权威值。
    fn grow_if_needed(&self) -> Result<(), SegmentError> {
        let max_load_factor = self.max_load_factor();
        let n_keys = self.n_keys.load(Ordering::Relaxed) as f64;
        if n_keys >= self.n_buckets.load(Ordering::Relaxed) as f64 * max_load_factor {
            self.reserve((n_keys / max_load_factor) as usize)?;
        }
        Ok(())
    }

    /// 重散列引擎，调用者必须已持有全部主段锁
    ///
    /// 并行遍历旧桶，每次从链头摘下一个节点、先断开其后继再搬迁，
    /// 节点因此可以独立落入新桶而不拖带旧链尾巴。对新桶的写入由副
    /// 锁串行化；副锁与已被独占的主锁不重叠，不会自锁。
    fn rehash_into(&self, n_new: usize) {
        let new_buckets: Vec<BucketSlot<K, V>> = chain::new_bucket_array(n_new);
        // SAFETY: 持有全部主段锁，旧桶数组此刻只有重散列自己访问，
        // 且并行区内每个旧桶号只被一个迭代触达。
        let buckets = unsafe { &*self.buckets.get() };
        parallel::parallel_for(buckets.len(), |bucket_id| {
            let slot = unsafe { &mut *buckets[bucket_id].head.get() };
            let mut detached = slot.take();
            while let Some(mut node) = detached {
                detached = node.next.take();
                let hash = self.hasher.hash_one(&node.key);
                let new_bucket_id = (hash % n_new as u64) as usize;
                let _guard = self.rehash_locks[new_bucket_id % self.n_segments].0.lock();
                // SAFETY: 持有目标桶对应的副锁。
                let dest = unsafe { &mut *new_buckets[new_bucket_id].head.get() };
                node.next = dest.take();
                *dest = Some(node);
            }
        });
        // SAFETY: 并行区已结束，旧桶数组再无存活引用。
        unsafe {
            *self.buckets.get() = new_buckets;
        }
        self.n_buckets.store(n_new, Ordering::Release);
    }

    /// 按下标顺序拿全部主段锁，守卫析构时同序释放
    fn lock_all_segments(&self) -> Vec<MutexGuard<'_, ()>> {
        self.segment_locks.iter().map(|lock| lock.0.lock()).collect()
    }
}
