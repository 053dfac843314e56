use std::ops::Range;
use std::sync::mpsc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::error::Error;
use crate::prelude::Float;

/// Execution backend of all parallel phases. Work is structured as
/// chunked `parallel_for` loops separated by implicit barriers; inside
/// a loop every thread reads a snapshot of the storage and writes only
/// to its thread-indexed accumulator slot.
pub enum Scheduler {
    /// Runs everything on the caller thread; the testing canonical.
    Sequential,
    /// Work-stealing thread pool.
    Pool(rayon::ThreadPool),
}

impl Scheduler {
    pub fn sequential() -> Self {
        Scheduler::Sequential
    }

    /// Pool with the given thread count, or one thread per core.
    pub fn pool(num_threads: Option<usize>) -> Result<Self, Error> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(num_threads) = num_threads {
            builder = builder.num_threads(num_threads);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::Resource(format!("cannot spawn thread pool: {}", e)))?;
        Ok(Scheduler::Pool(pool))
    }

    pub fn thread_count(&self) -> usize {
        match self {
            Scheduler::Sequential => 1,
            Scheduler::Pool(pool) => pool.current_num_threads(),
        }
    }

    /// Logical index of the calling thread, used to select the
    /// thread-local accumulator slot. Zero outside of a parallel
    /// section.
    pub fn thread_idx(&self) -> usize {
        match self {
            Scheduler::Sequential => 0,
            Scheduler::Pool(_) => rayon::current_thread_index().unwrap_or(0),
        }
    }

    /// Minimum chunk size that keeps the scheduling overhead of an
    /// element-wise loop negligible.
    pub fn recommended_granularity(&self, total: usize) -> usize {
        match self {
            Scheduler::Sequential => total.max(1),
            Scheduler::Pool(pool) => {
                (total / (4 * pool.current_num_threads())).clamp(1, 1000)
            }
        }
    }

    /// Cooperative chunked loop over an index range. The functor
    /// receives contiguous sub-ranges of at least `granularity`
    /// elements (except possibly the last).
    pub fn parallel_for<F>(&self, range: Range<usize>, granularity: usize, functor: F)
    where
        F: Fn(Range<usize>) + Sync,
    {
        let granularity = granularity.max(1);
        match self {
            Scheduler::Sequential => {
                if !range.is_empty() {
                    functor(range);
                }
            }
            Scheduler::Pool(pool) => {
                use rayon::prelude::*;
                let chunk_count = (range.len() + granularity - 1) / granularity;
                pool.install(|| {
                    (0..chunk_count).into_par_iter().for_each(|chunk| {
                        let from = range.start + chunk * granularity;
                        let to = (from + granularity).min(range.end);
                        functor(from..to);
                    });
                });
            }
        }
    }

    /// Runs two tasks, possibly concurrently, and joins before
    /// returning.
    pub fn parallel_invoke<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        match self {
            Scheduler::Sequential => (a(), b()),
            Scheduler::Pool(pool) => pool.install(|| rayon::join(a, b)),
        }
    }

    /// Fire-and-forget task submission; the returned handle blocks on
    /// `wait` until the task has run.
    pub fn submit<T, F>(&self, task: F) -> Future<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        match self {
            Scheduler::Sequential => {
                // executed eagerly on the caller thread
                let _ = sender.send(task());
            }
            Scheduler::Pool(pool) => {
                pool.spawn(move || {
                    let _ = sender.send(task());
                });
            }
        }
        Future { receiver }
    }
}

/// Handle of a submitted task.
pub struct Future<T> {
    receiver: mpsc::Receiver<T>,
}

impl<T> Future<T> {
    pub fn wait(self) -> T {
        self.receiver
            .recv()
            .expect("submitted task panicked before producing a value")
    }
}

/// One slot per scheduler thread. A slot is locked for the duration of
/// a chunk, so the per-chunk locking cost is negligible and the merge
/// step can visit the slots in a fixed order, making the result
/// deterministic for a given thread count.
pub struct ThreadLocal<T> {
    slots: Vec<Mutex<T>>,
}

impl<T> ThreadLocal<T> {
    pub fn new(scheduler: &Scheduler, make: impl Fn() -> T) -> Self {
        Self {
            slots: (0..scheduler.thread_count()).map(|_| Mutex::new(make())).collect(),
        }
    }

    pub fn local(&self, thread_idx: usize) -> MutexGuard<T> {
        self.slots[thread_idx]
            .lock()
            .expect("a thread panicked while holding its accumulator slot")
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Visits the slots in thread-index order.
    pub fn for_each_ordered(&mut self, mut action: impl FnMut(&mut T)) {
        for slot in &mut self.slots {
            action(slot.get_mut().expect("poisoned accumulator slot"));
        }
    }
}

/// Helpers mirroring OpenMP-style reductions over a parallel loop.
pub fn parallel_min(
    scheduler: &Scheduler,
    range: Range<usize>,
    granularity: usize,
    value: impl Fn(usize) -> Float + Sync,
) -> Float {
    let locals = ThreadLocal::new(scheduler, || Float::INFINITY);
    let mut locals = {
        scheduler.parallel_for(range, granularity, |chunk| {
            let thread_idx = scheduler.thread_idx();
            let mut slot = locals.local(thread_idx);
            for i in chunk {
                *slot = slot.min(value(i));
            }
        });
        locals
    };
    let mut result = Float::INFINITY;
    locals.for_each_ordered(|slot| result = result.min(*slot));
    result
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    fn check_scheduler(scheduler: Scheduler) {
        let counter = AtomicUsize::new(0);
        scheduler.parallel_for(0..1000, 16, |chunk| {
            counter.fetch_add(chunk.len(), Ordering::Relaxed);
        });
        assert_eq!(counter.load(Ordering::Relaxed), 1000);

        let (a, b) = scheduler.parallel_invoke(|| 1 + 1, || 2 + 2);
        assert_eq!((a, b), (2, 4));

        let future = scheduler.submit(|| 42);
        assert_eq!(future.wait(), 42);
    }

    #[test]
    fn sequential_scheduler() {
        check_scheduler(Scheduler::sequential());
    }

    #[test]
    fn pool_scheduler() {
        check_scheduler(Scheduler::pool(Some(4)).unwrap());
    }

    #[test]
    fn thread_indices_stay_in_range() {
        let scheduler = Scheduler::pool(Some(3)).unwrap();
        let count = scheduler.thread_count();
        scheduler.parallel_for(0..100, 1, |_| {
            assert!(scheduler.thread_idx() < count);
        });
    }

    #[test]
    fn parallel_min_reduction() {
        let scheduler = Scheduler::pool(Some(2)).unwrap();
        let values: Vec<Float> = (0..500).map(|i| (i as Float - 250.0).abs()).collect();
        let result = parallel_min(&scheduler, 0..values.len(), 10, |i| values[i]);
        assert_eq!(result, 0.0);
    }
}
