//! 核心类型约束 - 键与值的能力别名
//!
//! 容器在线程间共享，键与值都必须可跨线程移动和访问。

use std::hash::Hash;

/// 键约束: 可哈希、可判等，且可跨线程共享
pub trait MapKey: Hash + Eq + Send + Sync {}

impl<T: Hash + Eq + Send + Sync> MapKey for T {}

/// 值约束: 可跨线程共享
pub trait MapValue: Send + Sync {}

impl<T: Send + Sync> MapValue for T {}
