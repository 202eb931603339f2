//! 并行运行时接缝 - 容器专用的 rayon 线程池
//!
//! 容器本身不创建裸线程，只消费这里的三个原语: 区间并行、工作线程
//! 编号、工作线程数上限。并行区一律跑在专用线程池上: 池内线程只执行
//! 容器内部任务，从不竞争段锁，因此重散列在持有全部段锁时注入的任务
//! 总能被执行，即便外部线程池的线程全都阻塞在段锁上。嵌套触发的重散
//! 列也因此天然可并行。

use once_cell::sync::Lazy;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// 容器专用线程池
static GLOBAL_THREAD_POOL: Lazy<ThreadPool> = Lazy::new(|| {
    ThreadPoolBuilder::new()
        .thread_name(|index| format!("segment-hashtable-{index}"))
        .build()
        .expect("专用线程池构建失败")
});

/// 返回工作线程数上限，首次读取后不变
pub fn max_workers() -> usize {
    GLOBAL_THREAD_POOL.current_num_threads()
}

/// 返回当前工作线程在专用池内的编号
///
/// 调用线程不属于专用池时返回 `None`。
pub fn worker_id() -> Option<usize> {
    rayon::current_thread_index()
}

/// 对 `[0, n)` 的每个下标并行执行 `body`
pub fn parallel_for<F>(n: usize, body: F)
where
    F: Fn(usize) + Sync,
{
    GLOBAL_THREAD_POOL.install(|| (0..n).into_par_iter().for_each(|index| body(index)));
}
