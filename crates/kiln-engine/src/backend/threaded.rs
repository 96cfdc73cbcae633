use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering, fence};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::command::CommandBuffer;
use crate::dispatch::CommandProcessor;
use crate::driver::RenderDevice;

/// Something that consumes whole command buffers on the render thread.
pub trait BufferProcessor: Send + 'static {
    fn run_buffer(&mut self, buffer: &mut CommandBuffer);
}

impl<D: RenderDevice> BufferProcessor for CommandProcessor<D> {
    fn run_buffer(&mut self, buffer: &mut CommandBuffer) {
        CommandProcessor::run_buffer(self, buffer);
    }
}

/// The render thread panicked; no further buffers will run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderThreadLost;

impl fmt::Display for RenderThreadLost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("render thread is gone")
    }
}

impl std::error::Error for RenderThreadLost {}

#[derive(Default)]
struct Slot {
    /// Published by the producer, not yet picked up.
    pending: Option<CommandBuffer>,
    /// Set from publish until the render thread has finished the buffer.
    busy: bool,
    /// Finished buffer waiting to be reclaimed.
    done: Option<CommandBuffer>,
    /// Set when the render thread unwound.
    lost: bool,
}

struct Shared {
    slot: Mutex<Slot>,
    activity: Condvar,
    idle: Condvar,
    shutdown: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Render thread plus the single in-flight buffer slot.
///
/// At most one buffer is in flight; `run_buffer` blocks until the previous
/// one has finished, which is the only back-pressure between producer and
/// render thread.
pub struct ThreadedBackend<P: BufferProcessor> {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<P>>,
}

impl<P: BufferProcessor> ThreadedBackend<P> {
    /// Spawns the render thread bound to `processor`.
    pub fn start(processor: P) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::default()),
            activity: Condvar::new(),
            idle: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let thread = thread::Builder::new()
            .name("kiln-render".to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                move || render_loop(&shared, processor)
            })?;
        log::debug!("render thread started");
        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Hands `buffer` to the render thread. Blocks while a previous buffer
    /// is still running; does not wait for this one.
    pub fn run_buffer(&self, buffer: CommandBuffer) -> Result<(), RenderThreadLost> {
        let mut slot = self.wait_idle_locked();
        if slot.lost {
            return Err(RenderThreadLost);
        }
        slot.pending = Some(buffer);
        slot.busy = true;
        drop(slot);
        self.shared.activity.notify_one();
        Ok(())
    }

    /// Blocks until no buffer is in flight.
    pub fn wait_for_idle(&self) -> Result<(), RenderThreadLost> {
        if self.wait_idle_locked().lost {
            return Err(RenderThreadLost);
        }
        Ok(())
    }

    /// Waits for idle and returns the last finished buffer, if not yet taken.
    pub fn reclaim(&self) -> Option<CommandBuffer> {
        self.wait_idle_locked().done.take()
    }

    pub fn is_idle(&self) -> bool {
        !self.shared.lock().busy
    }

    pub fn is_lost(&self) -> bool {
        self.shared.lock().lost
    }

    fn wait_idle_locked(&self) -> MutexGuard<'_, Slot> {
        let mut slot = self.shared.lock();
        while slot.busy {
            slot = self
                .shared
                .idle
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
        slot
    }

    /// Latches shutdown, wakes the render thread and joins it. A buffer
    /// already published still runs first.
    ///
    /// Returns `None` if the render thread panicked.
    pub fn stop(mut self) -> Option<P> {
        self.stop_thread()
    }

    fn stop_thread(&mut self) -> Option<P> {
        let thread = self.thread.take()?;
        self.shared.shutdown.store(true, Ordering::Release);
        {
            // the render thread checks the flag under this lock
            let _slot = self.shared.lock();
            self.shared.activity.notify_one();
        }
        match thread.join() {
            Ok(processor) => {
                log::debug!("render thread stopped");
                Some(processor)
            }
            Err(_) => {
                log::error!("render thread panicked");
                None
            }
        }
    }
}

impl<P: BufferProcessor> Drop for ThreadedBackend<P> {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

/// Marks the slot lost and wakes waiters if the render thread unwinds.
struct UnwindGuard<'a>(&'a Shared);

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        if !thread::panicking() {
            return;
        }
        let mut slot = self.0.lock();
        slot.lost = true;
        slot.busy = false;
        slot.pending = None;
        drop(slot);
        self.0.idle.notify_all();
    }
}

fn render_loop<P: BufferProcessor>(shared: &Shared, mut processor: P) -> P {
    let _guard = UnwindGuard(shared);
    loop {
        let mut slot = shared.lock();
        while slot.pending.is_none() && !shared.shutdown.load(Ordering::Acquire) {
            slot = shared
                .activity
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
        let Some(mut buffer) = slot.pending.take() else {
            return processor;
        };
        drop(slot);

        processor.run_buffer(&mut buffer);
        fence(Ordering::SeqCst);

        let mut slot = shared.lock();
        slot.done = Some(buffer);
        slot.busy = false;
        drop(slot);
        shared.idle.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, CompletionSignal};
    use std::sync::mpsc;
    use std::time::Duration;

    /// Reports the record count of every buffer and can be held on a signal.
    struct Recorder {
        seen: mpsc::Sender<usize>,
        gate: Option<CompletionSignal>,
    }

    impl BufferProcessor for Recorder {
        fn run_buffer(&mut self, buffer: &mut CommandBuffer) {
            if let Some(gate) = &self.gate {
                gate.wait();
            }
            let _ = self.seen.send(buffer.len());
            buffer.reset();
        }
    }

    fn buffer_with(records: usize) -> CommandBuffer {
        let mut buffer = CommandBuffer::new(64, 64);
        for _ in 0..records {
            buffer.push(Command::Nop).expect("push");
        }
        buffer
    }

    // ── idle state ──

    #[test]
    fn idle_before_first_submission_and_after_wait() {
        let (tx, _rx) = mpsc::channel();
        let gate = CompletionSignal::new();
        let backend = ThreadedBackend::start(Recorder {
            seen: tx,
            gate: Some(gate.clone()),
        })
        .expect("spawn");
        assert!(backend.is_idle());

        backend.run_buffer(buffer_with(1)).expect("run");
        assert!(!backend.is_idle());

        gate.signal();
        backend.wait_for_idle().expect("idle");
        assert!(backend.is_idle());
        assert!(backend.stop().is_some());
    }

    // ── ordering ──

    #[test]
    fn buffers_run_in_submission_order() {
        let (tx, rx) = mpsc::channel();
        let backend = ThreadedBackend::start(Recorder { seen: tx, gate: None }).expect("spawn");
        for records in 1..=5 {
            backend.run_buffer(buffer_with(records)).expect("run");
        }
        backend.wait_for_idle().expect("idle");
        let seen: Vec<usize> = rx.try_iter().collect();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        backend.stop();
    }

    #[test]
    fn finished_buffer_is_reclaimed_empty() {
        let (tx, _rx) = mpsc::channel();
        let backend = ThreadedBackend::start(Recorder { seen: tx, gate: None }).expect("spawn");
        assert!(backend.reclaim().is_none());
        backend.run_buffer(buffer_with(3)).expect("run");
        let reclaimed = backend.reclaim().expect("finished buffer");
        assert!(reclaimed.is_empty());
        assert!(backend.reclaim().is_none());
    }

    // ── shutdown ──

    #[test]
    fn stop_wakes_a_waiting_thread() {
        let (tx, _rx) = mpsc::channel();
        let backend = ThreadedBackend::start(Recorder { seen: tx, gate: None }).expect("spawn");
        std::thread::sleep(Duration::from_millis(10));
        assert!(backend.stop().is_some());
    }

    #[test]
    fn published_buffer_runs_before_stop() {
        let (tx, rx) = mpsc::channel();
        let backend = ThreadedBackend::start(Recorder { seen: tx, gate: None }).expect("spawn");
        backend.run_buffer(buffer_with(2)).expect("run");
        backend.stop();
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![2]);
    }

    // ── render thread failure ──

    struct Panics;

    impl BufferProcessor for Panics {
        fn run_buffer(&mut self, _buffer: &mut CommandBuffer) {
            panic!("bad texture handle");
        }
    }

    #[test]
    fn panicking_processor_releases_waiters() {
        let backend = ThreadedBackend::start(Panics).expect("spawn");
        backend.run_buffer(buffer_with(1)).expect("first buffer is accepted");

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let waited = backend.wait_for_idle();
            let _ = tx.send((waited, backend));
        });
        let (waited, backend) = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("wait_for_idle returned after the panic");
        assert_eq!(waited, Err(RenderThreadLost));

        assert!(backend.is_idle());
        assert!(backend.is_lost());
        assert_eq!(backend.run_buffer(buffer_with(1)), Err(RenderThreadLost));
        assert!(backend.reclaim().is_none());
        assert!(backend.stop().is_none());
    }
}
