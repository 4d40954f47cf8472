//! Engine pool: lends engines to dispatch tasks, at most `workers` at once.

use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};

use super::{EngineError, SynthesisEngine};
use crate::error::Result;

type EngineSlot = Arc<Mutex<Arc<dyn SynthesisEngine>>>;

pub struct EnginePool {
    slots: Vec<EngineSlot>,
    permits: Arc<Semaphore>,
    isolated: bool,
}

/// An engine held by one task. Returned to the pool on drop.
pub struct EngineLease {
    // Field order matters: the slot is released before the permit.
    guard: OwnedMutexGuard<Arc<dyn SynthesisEngine>>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for EngineLease {
    type Target = dyn SynthesisEngine;

    fn deref(&self) -> &Self::Target {
        self.guard.as_ref()
    }
}

impl EnginePool {
    /// One engine shared by every worker. The engine must tolerate
    /// concurrent calls.
    pub fn shared(engine: Arc<dyn SynthesisEngine>, workers: usize) -> Self {
        let workers = workers.max(1);
        let slots = (0..workers)
            .map(|_| Arc::new(Mutex::new(Arc::clone(&engine))))
            .collect();
        Self {
            slots,
            permits: Arc::new(Semaphore::new(workers)),
            isolated: false,
        }
    }

    /// One engine per worker, built by `factory`. Each call holds its engine
    /// exclusively.
    pub fn isolated<F>(workers: usize, mut factory: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<Arc<dyn SynthesisEngine>>,
    {
        let workers = workers.max(1);
        let mut slots = Vec::with_capacity(workers);
        for worker in 0..workers {
            slots.push(Arc::new(Mutex::new(factory(worker)?)));
        }
        Ok(Self {
            slots,
            permits: Arc::new(Semaphore::new(workers)),
            isolated: true,
        })
    }

    pub fn workers(&self) -> usize {
        self.slots.len()
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    /// Wait for a free engine.
    pub async fn acquire(&self) -> std::result::Result<EngineLease, EngineError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        // Holding a permit guarantees a free slot
        for slot in &self.slots {
            if let Ok(guard) = Arc::clone(slot).try_lock_owned() {
                return Ok(EngineLease {
                    guard,
                    _permit: permit,
                });
            }
        }

        let Some(first) = self.slots.first() else {
            return Err(EngineError::Unavailable("engine pool is empty".into()));
        };
        let guard = Arc::clone(first).lock_owned().await;
        Ok(EngineLease {
            guard,
            _permit: permit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Waveform;
    use crate::synth::GenerationParams;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NamedEngine(String);

    #[async_trait]
    impl SynthesisEngine for NamedEngine {
        async fn synthesize(
            &self,
            _text: &str,
            _voice_id: &str,
            _params: &GenerationParams,
        ) -> std::result::Result<Waveform, EngineError> {
            Ok(Waveform::silence(0.01, 1000))
        }

        fn name(&self) -> &str {
            &self.0
        }
    }

    #[tokio::test]
    async fn test_shared_pool_lends_same_engine() {
        let pool = EnginePool::shared(Arc::new(NamedEngine("shared".into())), 2);
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_eq!(a.name(), "shared");
        assert_eq!(b.name(), "shared");
        assert!(!pool.is_isolated());
    }

    #[tokio::test]
    async fn test_isolated_pool_lends_distinct_engines() {
        let built = AtomicUsize::new(0);
        let pool = EnginePool::isolated(2, |i| {
            built.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NamedEngine(format!("engine-{}", i))) as Arc<dyn SynthesisEngine>)
        })
        .unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_ne!(a.name(), b.name());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let pool = Arc::new(EnginePool::shared(Arc::new(NamedEngine("one".into())), 1));
        let lease = pool.acquire().await.unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await.map(|l| l.name().to_string()) })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(lease);
        assert_eq!(waiter.await.unwrap().unwrap(), "one");
    }

    #[test]
    fn test_zero_workers_means_one() {
        let pool = EnginePool::shared(Arc::new(NamedEngine("x".into())), 0);
        assert_eq!(pool.workers(), 1);
    }
}
