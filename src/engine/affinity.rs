//! Designated engine worker thread
//!
//! Some engine calls must run on one particular thread (audio property
//! changes, shutdown). [`run_synchronous`] executes a job there and blocks
//! the caller until it has finished, so a value written through the engine
//! is visible to the very next query. Calls made from the worker itself run
//! inline.

use crossbeam_channel::{unbounded, Sender};
use log::{debug, error};
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Name of the designated worker thread
pub const WORKER_THREAD_NAME: &str = "engine-worker";

thread_local! {
    static ON_WORKER: Cell<bool> = Cell::new(false);
}

static WORKER: Lazy<Option<Sender<Job>>> = Lazy::new(spawn_worker);

fn spawn_worker() -> Option<Sender<Job>> {
    let (sender, receiver) = unbounded::<Job>();

    let spawned = thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || {
            ON_WORKER.with(|flag| flag.set(true));
            debug!("Engine worker thread started");
            while let Ok(job) = receiver.recv() {
                job();
            }
        });

    match spawned {
        Ok(_) => Some(sender),
        Err(e) => {
            error!("Failed to spawn engine worker thread: {}", e);
            None
        }
    }
}

/// Whether the current thread is the designated worker
pub fn is_worker_thread() -> bool {
    ON_WORKER.with(|flag| flag.get())
}

/// One-shot completion slot shared between caller and worker
struct Completion<R> {
    slot: Mutex<Option<thread::Result<R>>>,
    done: Condvar,
}

/// Run `job` on the designated worker and wait for its result
///
/// A panic inside `job` is resumed on the calling thread. If the worker
/// could not be started the job runs on the caller.
pub fn run_synchronous<F, R>(job: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if is_worker_thread() {
        return job();
    }

    let sender = match WORKER.as_ref() {
        Some(sender) => sender,
        None => return job(),
    };

    let completion = Arc::new(Completion {
        slot: Mutex::new(None),
        done: Condvar::new(),
    });

    let remote = Arc::clone(&completion);
    let posted = sender.send(Box::new(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(job));
        *remote.slot.lock() = Some(result);
        remote.done.notify_one();
    }));

    if let Err(returned) = posted {
        // Worker gone: run the job here instead
        (returned.0)();
    }

    let mut slot = completion.slot.lock();
    while slot.is_none() {
        completion.done.wait(&mut slot);
    }

    match slot.take() {
        Some(Ok(value)) => value,
        Some(Err(payload)) => panic::resume_unwind(payload),
        None => unreachable!("completion signalled without a result"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_runs_on_worker_thread() {
        assert!(!is_worker_thread());
        let (on_worker, name) = run_synchronous(|| {
            (is_worker_thread(), thread::current().name().map(str::to_string))
        });
        assert!(on_worker);
        assert_eq!(name.as_deref(), Some("engine-worker"));
    }

    #[test]
    fn test_result_visible_when_call_returns() {
        let value = Arc::new(AtomicU32::new(0));
        let writer = Arc::clone(&value);
        run_synchronous(move || {
            thread::sleep(std::time::Duration::from_millis(20));
            writer.store(42, Ordering::SeqCst);
        });
        assert_eq!(value.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_nested_call_runs_inline() {
        let result = run_synchronous(|| run_synchronous(|| 7) + 1);
        assert_eq!(result, 8);
    }

    #[test]
    fn test_many_callers_are_serialized() {
        let counter = Arc::new(AtomicU32::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..25 {
                        let counter = Arc::clone(&counter);
                        run_synchronous(move || counter.fetch_add(1, Ordering::SeqCst));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 200);
    }

    #[test]
    fn test_panic_is_resumed_on_caller() {
        let outcome = panic::catch_unwind(|| run_synchronous(|| panic!("boom")));
        assert!(outcome.is_err());
        // Worker keeps serving jobs afterwards
        assert_eq!(run_synchronous(|| 5), 5);
    }
}
