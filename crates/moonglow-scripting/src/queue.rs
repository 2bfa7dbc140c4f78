//! Cross-thread invocation bridge
//!
//! All mutable session state is confined to the session thread. Any other
//! thread submits closures here; the session thread drains the queue once
//! per tick. Ordering is FIFO across all producers (a single channel), with
//! no fairness policy between scripts.

use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::context::SessionCore;
use crate::error::BridgeError;
use crate::signal::StopToken;

/// Work executed on the session thread during a service pass
pub type Job = Box<dyn FnOnce(&mut SessionCore) + Send + 'static>;

/// How often a blocked invoker re-checks its stop token
const INVOKE_POLL: Duration = Duration::from_millis(50);

/// Producer handle, cheap to clone into scripts
#[derive(Clone)]
pub struct MainThreadQueue {
    tx: UnboundedSender<Job>,
}

/// Consumer side, owned by the session thread
pub struct JobReceiver {
    rx: UnboundedReceiver<Job>,
}

/// Create a connected queue pair
pub fn channel() -> (MainThreadQueue, JobReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MainThreadQueue { tx }, JobReceiver { rx })
}

impl MainThreadQueue {
    /// Fire-and-forget: run `job` at the next service pass
    pub fn send(&self, job: impl FnOnce(&mut SessionCore) + Send + 'static) {
        // A closed queue means the session is shutting down; nothing left
        // for the job to act on.
        let _ = self.tx.send(Box::new(job));
    }

    /// Run `f` on the session thread and block until its result is back.
    ///
    /// Must not be called from the session thread itself: the queue is only
    /// serviced between ticks, so that would deadlock. Cooperative scripts
    /// already run on the session thread and call the session directly.
    ///
    /// The wait re-checks `stop` while blocked; a stopped script gets
    /// `BridgeError::Stopped` even if the job later runs (its result is
    /// discarded).
    pub fn invoke<R, F>(&self, stop: &StopToken, f: F) -> Result<R, BridgeError>
    where
        R: Send + 'static,
        F: FnOnce(&mut SessionCore) -> R + Send + 'static,
    {
        let (result_tx, result_rx) = std_mpsc::channel();
        self.tx
            .send(Box::new(move |core: &mut SessionCore| {
                // Receiver may be gone if the script stopped waiting.
                let _ = result_tx.send(f(core));
            }))
            .map_err(|_| BridgeError::Closed)?;

        loop {
            if stop.is_stopped() {
                return Err(BridgeError::Stopped);
            }
            match result_rx.recv_timeout(INVOKE_POLL) {
                Ok(value) => return Ok(value),
                Err(std_mpsc::RecvTimeoutError::Timeout) => continue,
                Err(std_mpsc::RecvTimeoutError::Disconnected) => return Err(BridgeError::Closed),
            }
        }
    }
}

impl JobReceiver {
    /// Drain every pending job, in submission order. Called once per tick.
    pub fn service(&mut self, core: &mut SessionCore) -> usize {
        let mut ran = 0;
        loop {
            match self.rx.try_recv() {
                Ok(job) => {
                    job(core);
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if ran > 0 {
            trace!(target: "scripting", "serviced {} queued jobs", ran);
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SessionContext;
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn test_core() -> (SessionContext, ()) {
        (SessionContext::for_tests(), ())
    }

    #[test]
    fn jobs_run_fifo_exactly_once() {
        let (mut ctx, _) = test_core();
        let queue = ctx.queue();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        // Interleave submissions from several threads; each thread's own
        // submissions must still come out in its submission order.
        for t in 0..4u32 {
            let queue = queue.clone();
            let order = order.clone();
            handles.push(thread::spawn(move || {
                for i in 0..25u32 {
                    let order = order.clone();
                    queue.send(move |_core| order.lock().unwrap().push((t, i)));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        ctx.tick();

        let order = order.lock().unwrap();
        assert_eq!(order.len(), 100);
        for t in 0..4u32 {
            let per_thread: Vec<u32> =
                order.iter().filter(|(ot, _)| *ot == t).map(|(_, i)| *i).collect();
            assert_eq!(per_thread, (0..25).collect::<Vec<_>>());
        }
    }

    #[test]
    fn invoke_blocks_until_serviced() {
        let (mut ctx, _) = test_core();
        let queue = ctx.queue();
        let stop = StopToken::new();

        let handle = thread::spawn(move || queue.invoke(&stop, |_core| 6 * 7));

        // Give the worker time to submit, then service.
        thread::sleep(Duration::from_millis(100));
        assert!(!handle.is_finished(), "invoke returned before service pass");

        ctx.tick();
        assert_eq!(handle.join().unwrap().unwrap(), 42);
    }

    #[test]
    fn invoke_unblocks_on_stop() {
        let (ctx, _) = test_core();
        let queue = ctx.queue();
        let stop = StopToken::new();
        let waiter_stop = stop.clone();

        // Never serviced; only the stop can release the caller.
        let handle = thread::spawn(move || queue.invoke(&waiter_stop, |_core| 1));
        thread::sleep(Duration::from_millis(50));
        stop.stop();

        assert_eq!(handle.join().unwrap(), Err(BridgeError::Stopped));
        drop(ctx);
    }

    #[test]
    fn invoke_on_closed_queue_errors() {
        let (ctx, _) = test_core();
        let queue = ctx.queue();
        drop(ctx);
        let stop = StopToken::new();
        assert_eq!(queue.invoke(&stop, |_core| 1), Err(BridgeError::Closed));
    }
}
