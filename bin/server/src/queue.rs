//! Per-conversation event queue.
//!
//! Each conversation with pending events gets one worker task that handles
//! its events in arrival order. Different conversations run concurrently.
//! A worker exits after sitting idle and is respawned on the next event.
//! Shutting down closes every channel and waits for the workers to drain.

use async_trait::async_trait;
use relaybot_core::ConversationId;
use relaybot_dispatch::{DispatchError, InboundEvent, Router};
use rootcause::Report;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// How long a worker waits for another event before exiting.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Something that processes one event to completion.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: InboundEvent) -> Result<(), Report<DispatchError>>;
}

#[async_trait]
impl EventHandler for Router {
    async fn handle(&self, event: InboundEvent) -> Result<(), Report<DispatchError>> {
        Router::handle(self, event).await
    }
}

/// Live workers and the tasks running them.
#[derive(Default)]
struct WorkerSet {
    senders: HashMap<ConversationId, mpsc::UnboundedSender<InboundEvent>>,
    tasks: JoinSet<()>,
    closed: bool,
}

type Workers = Arc<Mutex<WorkerSet>>;

/// Fans events out to per-conversation workers.
#[derive(Clone)]
pub struct EventQueue {
    handler: Arc<dyn EventHandler>,
    workers: Workers,
    idle_timeout: Duration,
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

impl EventQueue {
    /// Creates a queue feeding `handler`.
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self::with_idle_timeout(handler, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(handler: Arc<dyn EventHandler>, idle_timeout: Duration) -> Self {
        Self {
            handler,
            workers: Arc::default(),
            idle_timeout,
        }
    }

    /// Queues `event` behind any earlier events for the same conversation.
    ///
    /// Events arriving after [`shutdown`](Self::shutdown) are dropped.
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, event: InboundEvent) {
        let id = event.conversation_id().clone();
        let mut workers = lock(&self.workers);
        if workers.closed {
            warn!(event_id = %event.event_id, "queue is shut down, dropping event");
            return;
        }

        let event = match workers.senders.get(&id) {
            Some(sender) => match sender.send(event) {
                Ok(()) => return,
                // The worker is gone; reclaim the event and start a new one.
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        // Reap workers that already exited.
        while workers.tasks.try_join_next().is_some() {}

        let (sender, receiver) = mpsc::unbounded_channel();
        // A fresh receiver is open, so this cannot fail.
        let _ = sender.send(event);
        workers.senders.insert(id.clone(), sender);

        debug!(conversation_id = %id, "starting conversation worker");
        let span = info_span!("conversation_worker", conversation_id = %id);
        workers.tasks.spawn(
            run_worker(
                id,
                receiver,
                self.handler.clone(),
                self.workers.clone(),
                self.idle_timeout,
            )
            .instrument(span),
        );
    }

    /// Number of conversations with a live worker.
    pub fn active_workers(&self) -> usize {
        lock(&self.workers).senders.len()
    }

    /// Stops accepting events and waits until every queued event is handled.
    pub async fn shutdown(&self) {
        let mut tasks = {
            let mut workers = lock(&self.workers);
            workers.closed = true;
            // Dropping the senders lets each worker finish its backlog and exit.
            workers.senders.clear();
            std::mem::take(&mut workers.tasks)
        };

        info!(workers = tasks.len(), "draining conversation workers");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "conversation worker panicked");
            }
        }
    }
}

fn lock(workers: &Workers) -> std::sync::MutexGuard<'_, WorkerSet> {
    // The set holds no invariants a panicking holder could break.
    workers
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

async fn run_worker(
    id: ConversationId,
    mut receiver: mpsc::UnboundedReceiver<InboundEvent>,
    handler: Arc<dyn EventHandler>,
    workers: Workers,
    idle_timeout: Duration,
) {
    loop {
        match tokio::time::timeout(idle_timeout, receiver.recv()).await {
            Ok(Some(event)) => {
                let event_id = event.event_id;
                let kind = event.kind.label();
                if let Err(report) = handler.handle(event).await {
                    error!(%event_id, kind, error = %report, "event handling failed");
                }
            }
            Ok(None) => return,
            Err(_) => {
                // Senders only push while holding the lock, so an empty
                // channel checked under the lock stays empty once removed.
                let idle = {
                    let mut set = lock(&workers);
                    let idle = receiver.is_empty();
                    if idle {
                        set.senders.remove(&id);
                    }
                    idle
                };
                if idle {
                    debug!("conversation worker idle, exiting");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaybot_dispatch::{EventKind, Origin};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<(String, String)>>,
        done: Notify,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, event: InboundEvent) -> Result<(), Report<DispatchError>> {
            let text = match &event.kind {
                EventKind::Text { text } => text.clone(),
                other => other.label().to_string(),
            };
            // Earlier events sleep longer, so a reordering would show.
            if let Ok(delay) = text.parse::<u64>() {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            self.seen
                .lock()
                .unwrap()
                .push((event.conversation_id().to_string(), text.clone()));
            self.done.notify_one();
            if text == "fail" {
                return Err(DispatchError::Transport {
                    reason: "boom".to_string(),
                }
                .into());
            }
            Ok(())
        }
    }

    fn text_event(id: &str, text: &str) -> InboundEvent {
        InboundEvent::new(
            Origin {
                conversation_id: ConversationId::new(id),
                display_name: "Ada".to_string(),
                private: true,
            },
            EventKind::Text {
                text: text.to_string(),
            },
        )
    }

    async fn wait_for(handler: &RecordingHandler, count: usize) {
        while handler.seen.lock().unwrap().len() < count {
            handler.done.notified().await;
        }
    }

    #[tokio::test]
    async fn events_for_one_conversation_keep_order() {
        let handler = Arc::new(RecordingHandler::default());
        let queue = EventQueue::new(handler.clone());

        for delay in ["30", "20", "10", "0"] {
            queue.enqueue(text_event("42", delay));
        }
        wait_for(&handler, 4).await;

        let seen: Vec<String> = handler
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect();
        assert_eq!(seen, vec!["30", "20", "10", "0"]);
        assert_eq!(queue.active_workers(), 1);
    }

    #[tokio::test]
    async fn conversations_do_not_block_each_other() {
        let handler = Arc::new(RecordingHandler::default());
        let queue = EventQueue::new(handler.clone());

        queue.enqueue(text_event("slow", "200"));
        queue.enqueue(text_event("fast", "0"));
        wait_for(&handler, 1).await;

        assert_eq!(handler.seen.lock().unwrap()[0].0, "fast");
        wait_for(&handler, 2).await;
    }

    #[tokio::test]
    async fn failure_does_not_stop_the_worker() {
        let handler = Arc::new(RecordingHandler::default());
        let queue = EventQueue::new(handler.clone());

        queue.enqueue(text_event("42", "fail"));
        queue.enqueue(text_event("42", "after"));
        wait_for(&handler, 2).await;

        assert_eq!(handler.seen.lock().unwrap()[1].1, "after");
    }

    #[tokio::test]
    async fn idle_worker_exits_and_respawns() {
        let handler = Arc::new(RecordingHandler::default());
        let queue = EventQueue::with_idle_timeout(handler.clone(), Duration::from_millis(20));

        queue.enqueue(text_event("42", "first"));
        wait_for(&handler, 1).await;
        while queue.active_workers() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        queue.enqueue(text_event("42", "second"));
        wait_for(&handler, 2).await;

        assert_eq!(handler.seen.lock().unwrap()[1].1, "second");
    }

    #[tokio::test]
    async fn shutdown_drains_queued_events() {
        let handler = Arc::new(RecordingHandler::default());
        let queue = EventQueue::new(handler.clone());

        for delay in ["20", "20", "20"] {
            queue.enqueue(text_event("42", delay));
        }
        queue.enqueue(text_event("7", "30"));
        queue.shutdown().await;

        assert_eq!(handler.seen.lock().unwrap().len(), 4);
        assert_eq!(queue.active_workers(), 0);
    }

    #[tokio::test]
    async fn events_after_shutdown_are_dropped() {
        let handler = Arc::new(RecordingHandler::default());
        let queue = EventQueue::new(handler.clone());
        queue.shutdown().await;

        queue.enqueue(text_event("42", "late"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(handler.seen.lock().unwrap().is_empty());
        assert_eq!(queue.active_workers(), 0);
    }
}
