//! Background rebuild scheduling / 后台重建调度
//!
//! A task queue keyed by archive id. Scheduling a rebuild for an id that
//! already has one in flight aborts the old job, so a superseding reload
//! deterministically wins instead of racing the old transaction to the
//! commit point. An aborted job's transaction is dropped and rolls back;
//! it never publishes a count or touches the cache.
//!
//! Rebuild transactions additionally share a single permit, so two
//! archives never hold write transactions against the index store at
//! the same time: they queue instead of contending.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

struct RebuildJob {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct RebuildScheduler {
    jobs: Mutex<HashMap<String, RebuildJob>>,
    next_gen: AtomicU64,
    rebuild_slots: Arc<Semaphore>,
}

impl RebuildScheduler {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            next_gen: AtomicU64::new(0),
            rebuild_slots: Arc::new(Semaphore::new(1)),
        }
    }

    /// 分配任务代号 / Allocate a job generation
    pub fn next_generation(&self) -> u64 {
        self.next_gen.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 获取重建许可（同一时间只有一个重建事务）
    /// / Acquire the single rebuild slot
    pub async fn acquire_rebuild_slot(&self) -> Option<OwnedSemaphorePermit> {
        self.rebuild_slots.clone().acquire_owned().await.ok()
    }

    /// 提交任务，替换同档案的在途任务 / Submit a job, superseding any in-flight one
    pub fn submit<F>(&self, zim_id: String, generation: u64, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut jobs = self.jobs.lock();
        jobs.retain(|_, job| !job.handle.is_finished());

        if let Some(prev) = jobs.remove(&zim_id) {
            prev.handle.abort();
            tracing::info!("Superseding in-flight index rebuild for {}", zim_id);
        }

        let handle = tokio::spawn(task);
        jobs.insert(zim_id, RebuildJob { generation, handle });
    }

    /// 取消指定档案的在途任务 / Cancel the in-flight job for one archive
    pub fn cancel(&self, zim_id: &str) {
        let mut jobs = self.jobs.lock();
        if let Some(job) = jobs.remove(zim_id) {
            job.handle.abort();
            tracing::info!("Cancelled in-flight index rebuild for {}", zim_id);
        }
    }

    /// 任务完成后清理自身记录 / Job self-cleanup on completion
    ///
    /// Only removes the entry if it still belongs to this generation;
    /// a job that was superseded must not evict its replacement.
    pub fn finish(&self, zim_id: &str, generation: u64) {
        let mut jobs = self.jobs.lock();
        if jobs.get(zim_id).map_or(false, |job| job.generation == generation) {
            jobs.remove(zim_id);
        }
    }

    /// 是否有任务在运行 / Whether any job is still running
    pub fn is_idle(&self) -> bool {
        self.jobs.lock().values().all(|job| job.handle.is_finished())
    }

    /// 等待所有在途任务结束 / Drain and await every in-flight job
    pub async fn join_all(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut jobs = self.jobs.lock();
            jobs.drain().map(|(_, job)| job.handle).collect()
        };
        for handle in handles {
            // aborted jobs surface a cancellation error, which is fine
            let _ = handle.await;
        }
    }
}

impl Default for RebuildScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn test_submit_and_join() {
        let scheduler = RebuildScheduler::new();
        let done = Arc::new(AtomicBool::new(false));

        let flag = done.clone();
        let generation = scheduler.next_generation();
        scheduler.submit("a.zim".to_string(), generation, async move {
            flag.store(true, Ordering::SeqCst);
        });

        scheduler.join_all().await;
        assert!(done.load(Ordering::SeqCst));
        assert!(scheduler.is_idle());
    }

    #[tokio::test]
    async fn test_supersede_aborts_previous() {
        let scheduler = Arc::new(RebuildScheduler::new());
        let first_finished = Arc::new(AtomicBool::new(false));

        let flag = first_finished.clone();
        let gen1 = scheduler.next_generation();
        scheduler.submit("a.zim".to_string(), gen1, async move {
            // parked forever; only an abort gets us out
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            flag.store(true, Ordering::SeqCst);
        });

        let gen2 = scheduler.next_generation();
        let sched = scheduler.clone();
        scheduler.submit("a.zim".to_string(), gen2, async move {
            sched.finish("a.zim", gen2);
        });

        scheduler.join_all().await;
        assert!(!first_finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stale_finish_does_not_evict_replacement() {
        let scheduler = RebuildScheduler::new();

        let gen1 = scheduler.next_generation();
        let gen2 = scheduler.next_generation();
        scheduler.submit("a.zim".to_string(), gen2, async move {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });

        // a superseded job reporting in must not remove the live entry
        scheduler.finish("a.zim", gen1);
        assert!(!scheduler.is_idle());

        // supersede with a quick job so the drain below terminates
        let gen3 = scheduler.next_generation();
        scheduler.submit("a.zim".to_string(), gen3, async {});
        scheduler.join_all().await;
    }
}
