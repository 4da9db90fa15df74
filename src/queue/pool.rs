use std::sync::Arc;

use bevy::prelude::*;


#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolSettings {
    /// Explicit worker count; `0` derives it from the hardware.
    pub worker_threads: usize,
    pub use_all_hardware_threads: bool,
    /// Run every task on the calling thread.
    pub synchronous: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            use_all_hardware_threads: false,
            synchronous: false,
        }
    }
}

impl PoolSettings {
    pub fn thread_count(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }

        let available = std::thread::available_parallelism().map_or(1, |n| n.get());
        if self.use_all_hardware_threads {
            available
        } else {
            available.saturating_sub(1).max(1)
        }
    }
}


/// Lazily created pool of calculate-colors workers, released again by the queue once idle.
pub struct WorkerPool {
    settings: PoolSettings,
    #[cfg(feature = "multi_threaded")]
    pool: Option<Arc<rayon::ThreadPool>>,
    #[cfg(not(feature = "multi_threaded"))]
    pool: Option<Arc<()>>,
}

impl WorkerPool {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            pool: None,
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    pub fn is_synchronous(&self) -> bool {
        self.settings.synchronous || cfg!(not(feature = "multi_threaded"))
    }

    pub fn is_active(&self) -> bool {
        self.pool.is_some()
    }

    /// Runs `job` on a worker, or inline when the pool is synchronous or cannot be built.
    pub fn execute(&mut self, job: impl FnOnce() + Send + 'static) {
        if self.is_synchronous() {
            job();
            return;
        }

        #[cfg(feature = "multi_threaded")]
        match self.pool() {
            Some(pool) => pool.spawn(job),
            None => job(),
        }

        #[cfg(not(feature = "multi_threaded"))]
        job();
    }

    #[cfg(feature = "multi_threaded")]
    fn pool(&mut self) -> Option<Arc<rayon::ThreadPool>> {
        if let Some(pool) = &self.pool {
            return Some(Arc::clone(pool));
        }

        let threads = self.settings.thread_count();
        match rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("vertex-paint-{i}"))
            .panic_handler(|_| error!("vertex paint worker panicked outside a task"))
            .build()
        {
            Ok(pool) => {
                info!("vertex paint worker pool started with {} threads", threads);
                let pool = Arc::new(pool);
                self.pool = Some(Arc::clone(&pool));
                Some(pool)
            }
            Err(err) => {
                warn!("failed to build vertex paint worker pool, running inline: {}", err);
                self.settings.synchronous = true;
                None
            }
        }
    }

    /// Drops the queue's handle; workers still running keep the pool alive until they finish.
    pub fn shutdown(&mut self) {
        if self.pool.take().is_some() {
            info!("vertex paint worker pool released");
        }
    }
}
