//! Integration Tests for the Memory Cache
//!
//! Exercises the public API end to end: concurrent use, deferred release
//! on each execution context, signal handling and background trimming.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;

use memory_cache::release::{DedicatedThread, Inline, ReleaseExecutor};
use memory_cache::{CacheBuilder, CacheConfig, MemoryCache};
use tokio::sync::mpsc;

// == Helper Functions ==

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Payload that reports the thread it was destroyed on.
struct Payload {
    id: u64,
    dropped_on: mpsc::UnboundedSender<(u64, ThreadId)>,
}

impl Drop for Payload {
    fn drop(&mut self) {
        let _ = self.dropped_on.send((self.id, thread::current().id()));
    }
}

type PayloadCache = MemoryCache<u64, Arc<Payload>>;

fn payload(id: u64, tx: &mpsc::UnboundedSender<(u64, ThreadId)>) -> Arc<Payload> {
    Arc::new(Payload {
        id,
        dropped_on: tx.clone(),
    })
}

// == Basic Behavior ==

#[test]
fn test_trim_to_cost_evicts_least_recent() -> anyhow::Result<()> {
    init_tracing();
    let cache: MemoryCache<&'static str, &'static str> = CacheBuilder::new()
        .auto_trim(false)
        .release_asynchronously(false)
        .build()?;

    cache.set("k1", "v1", 3)?;
    cache.set("k2", "v2", 5)?;
    cache.trim_to_cost(6);

    assert!(!cache.contains("k1"));
    assert!(cache.contains("k2"));
    assert_eq!(cache.total_cost(), 5);
    Ok(())
}

#[test]
fn test_zero_trims_empty_the_cache() -> anyhow::Result<()> {
    let cache: MemoryCache<u32, u32> = CacheBuilder::new()
        .auto_trim(false)
        .release_asynchronously(false)
        .build()?;

    for trim in [0, 1, 2] {
        for i in 0..10 {
            cache.set(i, i, 1)?;
        }
        match trim {
            0 => cache.trim_to_count(0),
            1 => cache.trim_to_cost(0),
            _ => cache.trim_to_age(Duration::ZERO),
        };
        assert_eq!(cache.count(), 0);
        assert_eq!(cache.total_cost(), 0);
        cache.validate()?;
    }
    Ok(())
}

#[test]
fn test_get_refreshes_recency_for_eviction() -> anyhow::Result<()> {
    let cache: MemoryCache<u32, u32> = CacheBuilder::new()
        .auto_trim(false)
        .release_asynchronously(false)
        .build()?;
    for i in 0..4 {
        cache.set(i, i, 0)?;
    }
    assert_eq!(cache.get(&0), Some(0));

    cache.trim_to_count(2);

    assert!(cache.contains(&0));
    assert!(cache.contains(&3));
    assert!(!cache.contains(&1));
    assert!(!cache.contains(&2));
    Ok(())
}

// == Concurrency ==

#[test]
fn test_concurrent_disjoint_sets() -> anyhow::Result<()> {
    const THREADS: u64 = 8;
    const PER_THREAD: u64 = 500;
    const MAX_COUNT: usize = 1000;

    let cache: Arc<MemoryCache<u64, u64>> = Arc::new(
        CacheBuilder::new()
            .auto_trim(false)
            .max_count(MAX_COUNT)
            .build()?,
    );

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let key = t * PER_THREAD + i;
                    cache.set(key, key, 1).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread panicked");
    }

    assert_eq!(cache.count(), (THREADS * PER_THREAD) as usize);
    cache.validate()?;

    cache.trim_to_count(cache.max_count());

    assert_eq!(cache.count(), MAX_COUNT.min((THREADS * PER_THREAD) as usize));
    assert_eq!(cache.total_cost(), MAX_COUNT as u64);
    cache.validate()?;
    Ok(())
}

#[test]
fn test_concurrent_mixed_operations_keep_invariants() -> anyhow::Result<()> {
    let cache: Arc<MemoryCache<u64, u64>> = Arc::new(
        CacheBuilder::new()
            .auto_trim(false)
            .build()?,
    );

    let handles: Vec<_> = (0..6u64)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..2_000u64 {
                    let key = (i * 7 + t) % 64;
                    match (i + t) % 6 {
                        0 | 1 => cache.set(key, i, i % 5).unwrap(),
                        2 | 3 => {
                            cache.get(&key);
                        }
                        4 => cache.remove(&key),
                        _ => {
                            cache.trim_to_count(32);
                            cache.trim_to_cost(50);
                        }
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker thread panicked");
    }

    cache.validate()?;
    assert!(cache.count() <= 64);
    Ok(())
}

// == Deferred Release ==

#[test]
fn test_values_are_destroyed_outside_the_lock() -> anyhow::Result<()> {
    // The value's destructor calls back into the cache. Releasing it while
    // the lock is still held would deadlock.
    struct Reentrant {
        cache: Arc<OnceLock<Weak<MemoryCache<u32, Arc<Reentrant>>>>>,
        observed: Arc<AtomicUsize>,
    }

    impl Drop for Reentrant {
        fn drop(&mut self) {
            if let Some(cache) = self.cache.get().and_then(Weak::upgrade) {
                self.observed.store(cache.count() + 1, Ordering::SeqCst);
            }
        }
    }

    let slot = Arc::new(OnceLock::new());
    let observed = Arc::new(AtomicUsize::new(0));
    let cache: Arc<MemoryCache<u32, Arc<Reentrant>>> = Arc::new(
        CacheBuilder::new()
            .auto_trim(false)
            .release_asynchronously(false)
            .build()?,
    );
    let _ = slot.set(Arc::downgrade(&cache));

    for i in 0..3 {
        cache.set(
            i,
            Arc::new(Reentrant {
                cache: Arc::clone(&slot),
                observed: Arc::clone(&observed),
            }),
            0,
        )?;
    }

    cache.remove(&0);
    assert_eq!(observed.load(Ordering::SeqCst), 3);

    cache.trim_to_count(1);
    assert_eq!(observed.load(Ordering::SeqCst), 2);

    cache.clear();
    assert_eq!(observed.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_async_release_runs_on_background_context() -> anyhow::Result<()> {
    let background = Arc::new(DedicatedThread::spawn("test-background")?);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cache: PayloadCache = CacheBuilder::new()
        .auto_trim(false)
        .release_asynchronously(true)
        .background_context(background.clone())
        .build()?;

    for id in 0..4 {
        cache.set(id, payload(id, &tx), 1)?;
    }
    cache.remove(&0);
    cache.clear();

    let mut destroyed = Vec::new();
    for _ in 0..4 {
        let (id, on) = rx.blocking_recv().expect("payload destroyed");
        assert_eq!(on, background.thread_id());
        destroyed.push(id);
    }
    destroyed.sort_unstable();
    assert_eq!(destroyed, vec![0, 1, 2, 3]);
    Ok(())
}

#[test]
fn test_dropping_cache_releases_remaining_entries_on_background() -> anyhow::Result<()> {
    let background = Arc::new(DedicatedThread::spawn("test-teardown")?);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cache: PayloadCache = CacheBuilder::new()
        .auto_trim(false)
        .release_asynchronously(true)
        .background_context(background.clone())
        .build()?;

    cache.set(1, payload(1, &tx), 1)?;
    cache.set(2, payload(2, &tx), 1)?;
    drop(cache);

    let mut destroyed = Vec::new();
    for _ in 0..2 {
        let (id, on) = rx.blocking_recv().expect("payload destroyed");
        assert_eq!(on, background.thread_id());
        destroyed.push(id);
    }
    destroyed.sort_unstable();
    assert_eq!(destroyed, vec![1, 2]);
    Ok(())
}

#[test]
fn test_async_release_without_runtime_leaves_the_caller() -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cache: PayloadCache = CacheBuilder::new()
        .name("no-runtime")
        .auto_trim(false)
        .release_asynchronously(true)
        .build()?;

    cache.set(5, payload(5, &tx), 0)?;
    cache.remove(&5);

    let (id, on) = rx.blocking_recv().expect("payload destroyed");
    assert_eq!(id, 5);
    assert_ne!(on, thread::current().id());
    Ok(())
}

#[test]
fn test_async_release_on_main_uses_main_context() -> anyhow::Result<()> {
    let main = Arc::new(DedicatedThread::spawn("test-main")?);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cache: PayloadCache = CacheBuilder::new()
        .auto_trim(false)
        .release_on_main(true)
        .release_asynchronously(true)
        .main_context(main.clone())
        .background_context(Arc::new(Inline))
        .build()?;

    cache.set(7, payload(7, &tx), 0)?;
    cache.trim_to_count(0);

    assert_eq!(rx.blocking_recv(), Some((7, main.thread_id())));
    Ok(())
}

#[test]
fn test_sync_release_off_main_still_hands_off() -> anyhow::Result<()> {
    let main = Arc::new(DedicatedThread::spawn("test-main-sync")?);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cache: PayloadCache = CacheBuilder::new()
        .auto_trim(false)
        .release_on_main(true)
        .release_asynchronously(false)
        .main_context(main.clone())
        .build()?;

    cache.set(1, payload(1, &tx), 0)?;
    cache.remove(&1);

    let (id, on) = rx.blocking_recv().expect("payload destroyed");
    assert_eq!(id, 1);
    assert_eq!(on, main.thread_id());
    assert_ne!(on, thread::current().id());
    Ok(())
}

#[test]
fn test_sync_release_on_main_is_inline() -> anyhow::Result<()> {
    let main = Arc::new(DedicatedThread::spawn("test-main-inline")?);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cache: Arc<PayloadCache> = Arc::new(
        CacheBuilder::new()
            .auto_trim(false)
            .release_on_main(true)
            .release_asynchronously(false)
            .main_context(main.clone())
            .build()?,
    );
    cache.set(1, payload(1, &tx), 0)?;

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let remover = Arc::clone(&cache);
    main.execute(Box::new(move || {
        remover.remove(&1);
        // An inline release has already run the destructor by now; an
        // enqueued one would still be waiting behind this job.
        let _ = done_tx.send(rx.try_recv().ok());
    }));

    let destroyed = done_rx.blocking_recv().expect("job ran");
    assert_eq!(destroyed, Some((1, main.thread_id())));
    Ok(())
}

#[test]
fn test_sync_release_without_main_is_inline() -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cache: PayloadCache = CacheBuilder::new()
        .auto_trim(false)
        .release_asynchronously(false)
        .build()?;

    cache.set(3, payload(3, &tx), 0)?;
    cache.set(3, payload(4, &tx), 0)?;
    assert_eq!(rx.try_recv().ok(), Some((3, thread::current().id())));

    cache.remove(&3);
    assert_eq!(rx.try_recv().ok(), Some((4, thread::current().id())));
    Ok(())
}

// == Signals ==

#[test]
fn test_signals_clear_by_default() -> anyhow::Result<()> {
    let config = CacheConfig {
        auto_trim: false,
        release_asynchronously: false,
        ..CacheConfig::default()
    };
    let cache: MemoryCache<u32, u32> = MemoryCache::from_config(&config)?;

    cache.set(1, 1, 0)?;
    cache.on_memory_pressure();
    assert_eq!(cache.count(), 0);

    cache.set(1, 1, 0)?;
    cache.on_background_transition();
    assert_eq!(cache.count(), 0);
    Ok(())
}

#[test]
fn test_background_hook_runs() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let cache: MemoryCache<u32, u32> = CacheBuilder::new()
        .auto_trim(false)
        .clear_on_background(false)
        .background_hook(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .build()?;
    cache.set(1, 1, 0)?;

    cache.on_background_transition();
    cache.on_background_transition();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.count(), 1);
    Ok(())
}

// == Background Trimming ==

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_trimmer_enforces_all_limits() -> anyhow::Result<()> {
    init_tracing();
    let cache: MemoryCache<u32, u32> = CacheBuilder::new()
        .name("trimmed")
        .max_count(5)
        .max_cost(40)
        .max_age(Duration::from_millis(300))
        .trim_interval(Duration::from_millis(25))
        .build()?;

    for i in 0..20 {
        cache.set(i, i, 10)?;
    }

    let mut trimmed = false;
    for _ in 0..100 {
        if cache.count() <= 4 && cache.total_cost() <= 40 {
            trimmed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(trimmed, "count {} cost {}", cache.count(), cache.total_cost());
    assert!(cache.contains(&19));

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(cache.count(), 0);
    assert!(cache.stats().evictions >= 20);
    Ok(())
}

#[tokio::test]
async fn test_trim_interval_change_is_picked_up() -> anyhow::Result<()> {
    let cache: MemoryCache<u32, u32> = CacheBuilder::new()
        .max_count(1)
        .trim_interval(Duration::from_millis(10))
        .build()?;
    cache.set_trim_interval(Duration::from_secs(3600));
    // Let the trimmer finish the sleep it started with the old interval.
    tokio::time::sleep(Duration::from_millis(100)).await;

    for i in 0..3 {
        cache.set(i, i, 0)?;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(cache.count(), 3);
    Ok(())
}
