//! Debounce primitive.
//!
//! [`DebounceState`] is the pure part: given the latest input, the last value
//! it emitted and the current instant, it decides whether something should be
//! emitted now. [`Debouncer`] owns the timer: a background task that re-arms
//! on every push and is aborted when the handle is dropped, so a pending
//! emission never fires after disposal.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone)]
pub struct DebounceState<T> {
    quiet: Duration,
    pending: Option<(T, Instant)>,
    committed: Option<T>,
}

impl<T: Clone + PartialEq> DebounceState<T> {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
            committed: None,
        }
    }

    /// Start from an already-settled value (e.g. a form loaded for editing):
    /// it is treated as emitted and will not be emitted again.
    pub fn with_committed(quiet: Duration, value: T) -> Self {
        Self {
            quiet,
            pending: None,
            committed: Some(value),
        }
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    pub fn committed(&self) -> Option<&T> {
        self.committed.as_ref()
    }

    /// Record a new input value; any earlier pending value is discarded and
    /// the quiet period restarts.
    pub fn observe(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.quiet));
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at)
    }

    /// Emit the pending value if it has been stable for the quiet period and
    /// differs from the last emitted value.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, at)) if *at <= now => {}
            _ => return None,
        }
        let (value, _) = self.pending.take()?;
        if self.committed.as_ref() == Some(&value) {
            return None;
        }
        self.committed = Some(value.clone());
        Some(value)
    }

    /// Drop any pending value without emitting it.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Forget the last emitted value so an equal one settles again.
    pub fn forget(&mut self) {
        self.committed = None;
    }
}

#[derive(Debug)]
enum Input<T> {
    Value(T),
    Forget,
}

/// Timer-backed debouncer. Push raw values in, read settled values from the
/// receiver returned by [`Debouncer::spawn`].
#[derive(Debug)]
pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<Input<T>>,
    task: JoinHandle<()>,
}

impl<T> Debouncer<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    pub fn spawn(quiet: Duration) -> (Self, mpsc::UnboundedReceiver<T>) {
        Self::spawn_with(DebounceState::new(quiet))
    }

    pub fn spawn_with(state: DebounceState<T>) -> (Self, mpsc::UnboundedReceiver<T>) {
        let (tx, input) = mpsc::unbounded_channel();
        let (output, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(state, input, output));
        (Self { tx, task }, rx)
    }

    pub fn push(&self, value: T) {
        // Only fails after the task is gone, at which point nobody listens.
        let _ = self.tx.send(Input::Value(value));
    }

    /// Applied in order with pushes: values pushed after this call may
    /// repeat the last emitted one.
    pub fn forget(&self) {
        let _ = self.tx.send(Input::Forget);
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<T: Clone + PartialEq>(
    mut state: DebounceState<T>,
    mut input: mpsc::UnboundedReceiver<Input<T>>,
    output: mpsc::UnboundedSender<T>,
) {
    loop {
        let deadline = state.deadline();
        tokio::select! {
            biased;
            next = input.recv() => match next {
                Some(Input::Value(value)) => state.observe(value, Instant::now()),
                Some(Input::Forget) => state.forget(),
                None => break,
            },
            _ = wait_until(deadline) => {
                if let Some(value) = state.poll(Instant::now()) {
                    if output.send(value).is_err() {
                        break;
                    }
                }
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
