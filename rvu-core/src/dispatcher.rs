//! Single-consumer action queue for cross-thread hand-off.
//!
//! The library worker posts zero-argument actions that must execute on the
//! consumer (rendering/UI) thread's own turn. Neither side blocks on the
//! other: `post` is a cheap enqueue, and `drain_once` runs whatever was
//! queued when it was called, once per consumer turn.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};

type Action = Box<dyn FnOnce() + Send>;

// ── Dispatcher ───────────────────────────────────────────────────

/// A FIFO queue of actions drained by a single consumer.
///
/// Ordering is FIFO per producer; across producers, the consumer observes
/// enqueue order. Actions posted before the consumer's first drain simply
/// queue until then.
pub struct Dispatcher {
    queue: Mutex<VecDeque<Action>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// The process-wide dispatcher instance.
    pub fn global() -> Arc<Dispatcher> {
        static GLOBAL: OnceLock<Arc<Dispatcher>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Dispatcher::new())))
    }

    /// Enqueue an action. Callable from any thread; never blocks beyond
    /// the queue lock.
    pub fn post(&self, action: impl FnOnce() + Send + 'static) {
        self.queue
            .lock()
            .expect("dispatcher lock poisoned")
            .push_back(Box::new(action));
    }

    /// Run every action queued at the time of the call, in enqueue order.
    ///
    /// Actions enqueued by the actions currently running are deferred to
    /// the next call. Returns the number of actions executed.
    pub fn drain_once(&self) -> usize {
        let batch = {
            let mut queue = self.queue.lock().expect("dispatcher lock poisoned");
            std::mem::take(&mut *queue)
        };
        let count = batch.len();
        for action in batch {
            action();
        }
        count
    }

    /// Number of actions currently queued.
    pub fn len(&self) -> usize {
        self.queue.lock().expect("dispatcher lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn queued_actions_run_in_order_on_one_drain() {
        let dispatcher = Dispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = Arc::clone(&log);
            dispatcher.post(move || log.lock().unwrap().push(i));
        }

        assert_eq!(dispatcher.len(), 3);
        assert_eq!(dispatcher.drain_once(), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(dispatcher.drain_once(), 0);
    }

    #[test]
    fn actions_posted_mid_drain_defer_to_next_drain() {
        let dispatcher = Arc::new(Dispatcher::new());
        let ran = Arc::new(AtomicUsize::new(0));

        let d = Arc::clone(&dispatcher);
        let r = Arc::clone(&ran);
        dispatcher.post(move || {
            let r2 = Arc::clone(&r);
            d.post(move || {
                r2.fetch_add(10, Ordering::SeqCst);
            });
            r.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(dispatcher.drain_once(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        assert_eq!(dispatcher.drain_once(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn posts_from_other_threads_are_observed() {
        let dispatcher = Arc::new(Dispatcher::new());
        let count = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let d = Arc::clone(&dispatcher);
                let c = Arc::clone(&count);
                std::thread::spawn(move || {
                    d.post(move || {
                        c.fetch_add(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(dispatcher.drain_once(), 4);
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }
}
