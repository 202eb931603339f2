//! 桶容量规划 - 从素数表选择可用桶数
//!
//! 素数桶数能缓解低位分布差的用户哈希函数造成的聚集。请求超出表尾时
//! 乘上放大因子，使有效范围超过表内最大素数的若干倍。

use crate::error::SegmentError;

/// 映射变体素数表，表尾约 2.1e9
const MAP_PRIMES: [usize; 29] = [
    5, 11, 23, 47, 97, 199, 409, 823, 1741, 3469, 6949, 14033, 28411, 57557, 116731, 236897,
    480881, 976369, 1982627, 4026031, 8175383, 16601593, 33712729, 68460391, 139022417, 282312799,
    573292817, 1164186217, 2147483647,
];

/// 集合变体素数表
const SET_PRIMES: [usize; 20] = [
    11, 17, 29, 47, 79, 127, 211, 337, 547, 887, 1433, 2311, 3739, 6053, 9791, 15858, 25667,
    41539, 67213, 104729,
];

const MAP_SCALE_FACTOR: usize = 817_504_253;

const SET_SCALE_FACTOR: usize = 15_858;

/// 桶容量规划器
///
/// 返回值恒不小于请求值，且恒为表内素数与至多 `max_scale_passes` 个
/// 放大因子的乘积。
#[derive(Clone, Copy, Debug)]
pub struct CapacityPlanner {
    primes: &'static [usize],
    scale_factor: usize,
    max_scale_passes: usize,
}

impl CapacityPlanner {
    /// 映射变体规划器
    pub const fn for_map() -> Self {
        Self {
            primes: &MAP_PRIMES,
            scale_factor: MAP_SCALE_FACTOR,
            max_scale_passes: 1,
        }
    }

    /// 集合变体规划器
    pub const fn for_set() -> Self {
        Self {
            primes: &SET_PRIMES,
            scale_factor: SET_SCALE_FACTOR,
            max_scale_passes: 3,
        }
    }

    /// 表内最小素数，同时作为初始桶数
    pub const fn smallest(&self) -> usize {
        self.primes[0]
    }

    /// 返回不小于 `min_buckets` 的可用桶数
    ///
    /// 放大后仍超出表尾时返回 [`SegmentError::CapacityExceeded`]。
    pub fn plan(&self, min_buckets: usize) -> Result<usize, SegmentError> {
        let largest = self.primes[self.primes.len() - 1];
        let mut remaining = min_buckets;
        let mut planned: usize = 1;
        for _ in 0..self.max_scale_passes {
            if remaining > largest {
                // 向上取整，保证 planned * 表内素数 >= min_buckets
                remaining = remaining.div_ceil(self.scale_factor);
                planned *= self.scale_factor;
            }
        }
        if remaining > largest {
            return Err(SegmentError::CapacityExceeded {
                requested: min_buckets,
            });
        }
        let index = self.primes.partition_point(|&prime| prime < remaining);
        planned
            .checked_mul(self.primes[index])
            .ok_or(SegmentError::CapacityExceeded {
                requested: min_buckets,
            })
    }
}

// 单元测试
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_smallest() {
        assert_eq!(CapacityPlanner::for_map().smallest(), 5);
        assert_eq!(CapacityPlanner::for_set().smallest(), 11);
    }

    #[test]
    fn test_plan_small_requests() {
        let planner = CapacityPlanner::for_map();
        assert_eq!(planner.plan(0).unwrap(), 5);
        assert_eq!(planner.plan(1).unwrap(), 5);
        assert_eq!(planner.plan(5).unwrap(), 5);
        assert_eq!(planner.plan(6).unwrap(), 11);
        assert_eq!(planner.plan(100).unwrap(), 199);
    }

    #[test]
    fn test_plan_is_monotone_and_covering() {
        let planner = CapacityPlanner::for_map();
        let mut previous = 0;
        for request in [0usize, 3, 10, 97, 98, 1000, 1_000_000, 2_000_000_000] {
            let planned = planner.plan(request).unwrap();
            assert!(planned >= request, "规划值必须覆盖请求值");
            assert!(planned >= previous, "规划值必须随请求单调不减");
            previous = planned;
        }
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_plan_beyond_prime_table() {
        let planner = CapacityPlanner::for_map();
        // 超出表尾一次放大
        let planned = planner.plan(4_000_000_000).unwrap();
        assert!(planned >= 4_000_000_000);
        assert_eq!(planned % 817_504_253, 0);

        // 放大一次仍然不够
        assert!(matches!(
            planner.plan(usize::MAX),
            Err(SegmentError::CapacityExceeded { .. })
        ));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_set_plan_scales_repeatedly() {
        let planner = CapacityPlanner::for_set();
        assert_eq!(planner.plan(10).unwrap(), 11);
        assert_eq!(planner.plan(104_729).unwrap(), 104_729);

        // 集合表尾小，依次放大最多三次
        let planned = planner.plan(10_000_000).unwrap();
        assert!(planned >= 10_000_000);
        assert_eq!(planned % 15_858, 0);

        let huge = planner.plan(1_000_000_000_000).unwrap();
        assert!(huge >= 1_000_000_000_000);

        assert!(matches!(
            planner.plan(usize::MAX),
            Err(SegmentError::CapacityExceeded { .. })
        ));
    }
}
