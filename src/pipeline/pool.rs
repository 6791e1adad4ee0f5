//! Pull-based bounded worker pool.
//!
//! Used at both nesting levels of the pipeline: documents within a batch and
//! pages within a document. Workers share an atomic cursor and each pulls the
//! next unclaimed index when it finishes its current item, so a slow item
//! never stalls its neighbors the way fixed chunking would. Results land in
//! per-index slots, preserving input order regardless of completion order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Run `work` over `items` with at most `concurrency` worker threads.
///
/// Spawns `min(concurrency, items.len())` scoped threads. Output order
/// matches input order. Panics in `work` propagate out of the scope.
pub fn run_pool<T, R, F>(items: &[T], concurrency: usize, work: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> R + Sync,
{
    if items.is_empty() {
        return Vec::new();
    }

    let workers = concurrency.max(1).min(items.len());
    let cursor = AtomicUsize::new(0);
    let slots: Vec<Mutex<Option<R>>> = items.iter().map(|_| Mutex::new(None)).collect();

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let idx = cursor.fetch_add(1, Ordering::SeqCst);
                if idx >= items.len() {
                    break;
                }
                let result = work(idx, &items[idx]);
                *slots[idx].lock().unwrap() = Some(result);
            });
        }
    });

    slots
        .into_iter()
        .map(|slot| {
            slot.into_inner()
                .unwrap()
                .unwrap_or_else(|| unreachable!("pool slot left unfilled"))
        })
        .collect()
}
