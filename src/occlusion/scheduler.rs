/// Tile scheduling: a dispatch order sorted by bin size and a shared atomic
/// cursor that idle workers pull the next tile from.
use std::sync::atomic::{AtomicUsize, Ordering};

/// Runs a fixed number of independent tasks and blocks until all finish.
pub trait WorkerPool {
    /// Parallelism the pool can offer.
    fn num_workers(&self) -> usize;

    /// Call `task(i)` for every `i` in `0..num_tasks`, possibly in parallel.
    fn run(&self, num_tasks: usize, task: &(dyn Fn(usize) + Sync));
}

/// Runs every task on the calling thread.
#[derive(Copy, Clone, Debug, Default)]
pub struct InlinePool;

impl WorkerPool for InlinePool {
    fn num_workers(&self) -> usize {
        1
    }

    fn run(&self, num_tasks: usize, task: &(dyn Fn(usize) + Sync)) {
        for i in 0..num_tasks {
            task(i);
        }
    }
}

impl WorkerPool for rayon::ThreadPool {
    fn num_workers(&self) -> usize {
        self.current_num_threads()
    }

    fn run(&self, num_tasks: usize, task: &(dyn Fn(usize) + Sync)) {
        self.scope(|s| {
            for i in 0..num_tasks {
                s.spawn(move |_| task(i));
            }
        });
    }
}

/// Rayon's global pool.
#[derive(Copy, Clone, Debug, Default)]
pub struct GlobalRayonPool;

impl WorkerPool for GlobalRayonPool {
    fn num_workers(&self) -> usize {
        rayon::current_num_threads()
    }

    fn run(&self, num_tasks: usize, task: &(dyn Fn(usize) + Sync)) {
        rayon::scope(|s| {
            for i in 0..num_tasks {
                s.spawn(move |_| task(i));
            }
        });
    }
}

pub struct TileScheduler {
    order: Vec<u32>,
    cursor: AtomicUsize,
}

impl TileScheduler {
    pub fn new(num_tiles: usize) -> Self {
        Self {
            order: (0..num_tiles as u32).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Tiles in dispatch order.
    #[inline]
    pub fn order(&self) -> &[u32] {
        &self.order
    }

    /// Tiles handed out so far in the current pass.
    #[inline]
    pub fn claimed(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Sort tiles by descending bin count (ties by index) and rewind the cursor.
    pub fn prepare(&mut self, counts: &[u32]) {
        debug_assert_eq!(counts.len(), self.order.len());
        for (i, tile) in self.order.iter_mut().enumerate() {
            *tile = i as u32;
        }
        self.order
            .sort_unstable_by(|&a, &b| counts[b as usize].cmp(&counts[a as usize]).then(a.cmp(&b)));
        self.cursor.store(0, Ordering::Release);
    }

    /// Run `num_jobs` workers on `pool`; each claims tiles until none are left.
    pub fn dispatch<P, F>(&self, pool: &P, num_jobs: usize, rasterize_tile: F)
    where
        P: WorkerPool + ?Sized,
        F: Fn(usize) + Sync,
    {
        let num_tiles = self.order.len();
        pool.run(num_jobs, &|_job| {
            while let Some(ordinal) = self.claim(num_tiles) {
                rasterize_tile(self.order[ordinal] as usize);
            }
        });
    }

    #[inline]
    fn claim(&self, num_tiles: usize) -> Option<usize> {
        self.cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| (c < num_tiles).then_some(c + 1))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn order_is_descending_by_count_and_stable_on_ties() {
        let mut sched = TileScheduler::new(6);
        sched.prepare(&[3, 9, 0, 9, 1, 3]);
        assert_eq!(sched.order(), &[1, 3, 0, 5, 4, 2]);
    }

    #[test]
    fn inline_pool_visits_every_tile_once_in_order() {
        let mut sched = TileScheduler::new(5);
        sched.prepare(&[0, 4, 2, 1, 3]);

        let seen = Mutex::new(Vec::new());
        sched.dispatch(&InlinePool, 3, |tile| seen.lock().unwrap().push(tile));

        assert_eq!(seen.into_inner().unwrap(), vec![1, 4, 2, 3, 0]);
        assert_eq!(sched.claimed(), 5);
    }

    #[test]
    fn thread_pool_visits_every_tile_exactly_once() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        assert_eq!(pool.num_workers(), 4);

        let counts: Vec<u32> = (0..64).map(|i| (i * 37 % 11) as u32).collect();
        let mut sched = TileScheduler::new(counts.len());
        sched.prepare(&counts);

        let hits: Vec<AtomicUsize> = (0..counts.len()).map(|_| AtomicUsize::new(0)).collect();
        sched.dispatch(&pool, 4, |tile| {
            hits[tile].fetch_add(1, Ordering::Relaxed);
        });

        assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
        assert_eq!(sched.claimed(), counts.len());

        // A second pass starts from a rewound cursor.
        sched.prepare(&counts);
        assert_eq!(sched.claimed(), 0);
        sched.dispatch(&GlobalRayonPool, 2, |tile| {
            hits[tile].fetch_add(1, Ordering::Relaxed);
        });
        assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 2));
    }
}
