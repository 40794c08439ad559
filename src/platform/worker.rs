//! Single-consumer background workers.
//!
//! Every domain that must never interleave (the RUM scope tree, one feature's file writer, one
//! feature's upload loop) is pinned to exactly one [`SingleWorker`]: a dedicated thread driving
//! a current-thread tokio runtime and draining a bounded queue in submission order.

use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_channel::{Receiver, Sender, TrySendError};
use async_trait::async_trait;
use tokio::runtime::Builder;

/// Behaviour driven by a [`SingleWorker`].
///
/// Each callback returns the idle timeout to arm next: when no message arrives within that
/// delay, [`WorkerTask::on_idle`] runs. Any message re-arms the timer, so `on_idle` acts as a
/// debounced timer. `None` disables it until a later callback returns a delay.
#[async_trait]
pub trait WorkerTask: Send + 'static {
    type Message: Send + 'static;

    async fn on_message(&mut self, message: Self::Message) -> Option<Duration>;

    async fn on_idle(&mut self) -> Option<Duration> {
        None
    }

    /// Runs once after the queue was closed and fully drained.
    async fn on_shutdown(&mut self) {}
}

pub struct SingleWorker<M> {
    name: String,
    sender: Sender<M>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<M> std::fmt::Debug for SingleWorker<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleWorker")
            .field("name", &self.name)
            .field("queued", &self.sender.len())
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl<M: Send + 'static> SingleWorker<M> {
    pub fn spawn<T>(
        name: impl Into<String>,
        capacity: usize,
        initial_idle: Option<Duration>,
        task: T,
    ) -> std::io::Result<Self>
    where
        T: WorkerTask<Message = M>,
    {
        let name = name.into();
        let (sender, receiver) = async_channel::bounded(capacity.max(1));
        let thread_name = name.clone();
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        log::error!("worker {thread_name} could not start its runtime: {err}");
                        receiver.close();
                        return;
                    }
                };
                runtime.block_on(run_loop(task, receiver, initial_idle));
            })?;

        Ok(Self {
            name,
            sender,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueues `message` without blocking. Returns `false` when the message was dropped
    /// because the queue is full or the worker is shut down.
    pub fn submit(&self, message: M) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!("worker {} queue is full, dropping message", self.name);
                false
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!("worker {} is shut down, dropping message", self.name);
                false
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender.is_closed()
    }

    /// Stops accepting messages, lets the worker process everything already queued and waits
    /// for its thread to exit. Calling it from the worker thread itself does not wait.
    pub fn shutdown(&self) {
        self.sender.close();
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("worker {} terminated with a panic", self.name);
            }
        }
    }
}

impl<M> Drop for SingleWorker<M> {
    fn drop(&mut self) {
        self.sender.close();
    }
}

async fn run_loop<T: WorkerTask>(
    mut task: T,
    receiver: Receiver<T::Message>,
    mut idle: Option<Duration>,
) {
    loop {
        let next = match idle {
            Some(timeout) => match tokio::time::timeout(timeout, receiver.recv()).await {
                Ok(Ok(message)) => task.on_message(message).await,
                Ok(Err(_)) => break,
                Err(_) => task.on_idle().await,
            },
            None => match receiver.recv().await {
                Ok(message) => task.on_message(message).await,
                Err(_) => break,
            },
        };
        idle = next;
    }
    task.on_shutdown().await;
}
