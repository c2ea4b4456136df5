// src/transport/memory/transport.rs

//! In-memory broker and session implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use bytes::Bytes;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::{
    // ---
    log_debug,
    log_info,
    AckMode,
    Acker,
    Consumer,
    Delivery,
    Properties,
    Queue,
    QueueOptions,
    Result,
    RpcError,
    Session,
    SessionPtr,
};

/// Acquire a mutex guard, ignoring poisoning.
///
/// The guarded maps hold no invariants spanning several entries, so state
/// left behind by a panicking holder is still usable.
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct Message {
    body: Bytes,
    props: Properties,
}

struct QueueEntry {
    // ---
    tx: mpsc::UnboundedSender<Message>,
    // Taken by the (single) consumer.
    rx: Option<mpsc::UnboundedReceiver<Message>>,
    exclusive_owner: Option<u64>,
    auto_delete: bool,
}

#[derive(Default)]
struct BrokerState {
    // ---
    queues: Mutex<HashMap<String, QueueEntry>>,
    acks: Mutex<HashMap<u64, usize>>,
    delivered: Mutex<Vec<u64>>,
    next_queue: AtomicU64,
    next_tag: AtomicU64,
    next_session: AtomicU64,
    fail_publishes: AtomicBool,
}

/// In-process message broker.
///
/// Cheap to clone; clones share the same queues.
///
/// # Example
///
/// ```
/// # use mq_service::{MemoryBroker, QueueOptions, Session};
/// # async fn example() -> mq_service::Result<()> {
/// let broker = MemoryBroker::new();
/// let session = broker.connect().await?;
/// let queue = session.declare_queue("svc.audio", QueueOptions::service()).await?;
/// assert_eq!(queue.name(), "svc.audio");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide broker registered under `name`, created on first use.
    ///
    /// This is what `memory://<name>` URIs resolve to.
    pub fn named(name: &str) -> Self {
        // ---
        static REGISTRY: OnceLock<Mutex<HashMap<String, MemoryBroker>>> = OnceLock::new();

        let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
        lock_ignore_poison(registry)
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Open a new session on this broker.
    pub async fn connect(&self) -> Result<SessionPtr> {
        // ---
        let id = self.state.next_session.fetch_add(1, Ordering::SeqCst) + 1;

        log_debug!("memory session {id} opened");

        Ok(Arc::new(MemorySession {
            id,
            name: format!("memory-{id}"),
            state: Arc::clone(&self.state),
            prefetch: AtomicU16::new(0),
            closed: AtomicBool::new(false),
            consumers: Mutex::new(Vec::new()),
            owned_queues: Mutex::new(Vec::new()),
        }))
    }

    /// Make every subsequent publish fail (`true`) or succeed again (`false`).
    pub fn fail_publishes(&self, fail: bool) {
        self.state.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Number of acknowledgement attempts for `delivery_tag`.
    ///
    /// Repeated [`Delivery::ack`] calls are counted too, although they never
    /// reach the queue, so anything above 1 means the delivery was
    /// acknowledged more than once.
    pub fn ack_count(&self, delivery_tag: u64) -> usize {
        // ---
        lock_ignore_poison(&self.state.acks)
            .get(&delivery_tag)
            .copied()
            .unwrap_or(0)
    }

    /// Tags of every delivery handed to a consumer, in delivery order.
    pub fn delivered_tags(&self) -> Vec<u64> {
        lock_ignore_poison(&self.state.delivered).clone()
    }

    /// Whether a queue named `name` currently exists.
    pub fn has_queue(&self, name: &str) -> bool {
        lock_ignore_poison(&self.state.queues).contains_key(name)
    }
}

/// Records the acknowledgement and releases the prefetch slot it held.
struct MemoryAcker {
    // ---
    state: Arc<BrokerState>,
    permit: Mutex<Option<OwnedSemaphorePermit>>,
}

#[async_trait::async_trait]
impl Acker for MemoryAcker {
    async fn ack(&self, delivery_tag: u64) -> Result<()> {
        // ---
        let count = {
            let mut acks = lock_ignore_poison(&self.state.acks);
            let count = acks.entry(delivery_tag).or_insert(0);
            *count += 1;
            *count
        };

        if count > 1 {
            return Err(RpcError::AlreadyAcknowledged(delivery_tag));
        }

        lock_ignore_poison(&self.permit).take();
        Ok(())
    }

    fn repeated_ack(&self, delivery_tag: u64) {
        // ---
        *lock_ignore_poison(&self.state.acks)
            .entry(delivery_tag)
            .or_insert(0) += 1;
    }
}

/// Holds a queue's receiver while a consumer reads it.
///
/// Dropping the guard (consumer ended or aborted) hands the receiver back to
/// the queue, so messages published meanwhile wait for the next consumer.
struct QueueReader {
    // ---
    state: Arc<BrokerState>,
    queue: String,
    rx: Option<mpsc::UnboundedReceiver<Message>>,
}

impl QueueReader {
    async fn recv(&mut self) -> Option<Message> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}

impl Drop for QueueReader {
    fn drop(&mut self) {
        // ---
        let Some(rx) = self.rx.take() else {
            return;
        };
        if let Some(entry) = lock_ignore_poison(&self.state.queues).get_mut(&self.queue) {
            if entry.rx.is_none() {
                entry.rx = Some(rx);
            }
        }
    }
}

struct MemorySession {
    // ---
    id: u64,
    name: String,
    state: Arc<BrokerState>,
    prefetch: AtomicU16,
    closed: AtomicBool,
    consumers: Mutex<Vec<JoinHandle<()>>>,
    owned_queues: Mutex<Vec<String>>,
}

impl MemorySession {
    fn ensure_open(&self) -> Result<()> {
        // ---
        if self.closed.load(Ordering::SeqCst) {
            return Err(RpcError::Transport(format!(
                "{}: session is closed",
                self.name
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Session for MemorySession {
    // ---
    fn session_id(&self) -> &str {
        &self.name
    }

    async fn declare_queue(&self, name: &str, opts: QueueOptions) -> Result<Queue> {
        // ---
        self.ensure_open()?;

        let name = if name.is_empty() {
            let n = self.state.next_queue.fetch_add(1, Ordering::SeqCst) + 1;
            format!("amq.gen-{n}")
        } else {
            name.to_string()
        };

        let mut queues = lock_ignore_poison(&self.state.queues);

        if let Some(existing) = queues.get(&name) {
            return match existing.exclusive_owner {
                Some(owner) if owner != self.id => Err(RpcError::Transport(format!(
                    "queue declare failed: {name} is locked by another session"
                ))),
                _ => Ok(Queue::new(name)),
            };
        }

        let (tx, rx) = mpsc::unbounded_channel();
        queues.insert(
            name.clone(),
            QueueEntry {
                tx,
                rx: Some(rx),
                exclusive_owner: opts.exclusive.then_some(self.id),
                auto_delete: opts.auto_delete,
            },
        );
        drop(queues);

        if opts.exclusive || opts.auto_delete {
            lock_ignore_poison(&self.owned_queues).push(name.clone());
        }

        log_debug!("[{}] declared queue {name}", self.name);
        Ok(Queue::new(name))
    }

    async fn set_prefetch(&self, count: u16) -> Result<()> {
        // ---
        self.ensure_open()?;
        self.prefetch.store(count, Ordering::SeqCst);
        Ok(())
    }

    async fn consume(&self, queue: &Queue, mode: AckMode) -> Result<Consumer> {
        // ---
        self.ensure_open()?;

        let rx = {
            let mut queues = lock_ignore_poison(&self.state.queues);
            let entry = queues.get_mut(queue.name()).ok_or_else(|| {
                RpcError::Transport(format!("consume failed: no queue {queue}"))
            })?;
            if let Some(owner) = entry.exclusive_owner {
                if owner != self.id {
                    return Err(RpcError::Transport(format!(
                        "consume failed: {queue} is exclusive to another session"
                    )));
                }
            }
            entry.rx.take().ok_or_else(|| {
                RpcError::Transport(format!("consume failed: {queue} already has a consumer"))
            })?
        };

        let prefetch = self.prefetch.load(Ordering::SeqCst);
        let window = match (mode, prefetch) {
            (AckMode::Manual, n) if n > 0 => Some(Arc::new(Semaphore::new(n as usize))),
            _ => None,
        };

        let (out_tx, out_rx) = mpsc::channel(16);
        let state = Arc::clone(&self.state);
        let session = self.name.clone();
        let queue_name = queue.name().to_string();
        let mut reader = QueueReader {
            state: Arc::clone(&self.state),
            queue: queue_name.clone(),
            rx: Some(rx),
        };

        let handle = tokio::spawn(async move {
            // ---
            loop {
                let permit = match &window {
                    Some(sem) => match Arc::clone(sem).acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                    None => None,
                };

                let Some(msg) = reader.recv().await else {
                    break;
                };

                let tag = state.next_tag.fetch_add(1, Ordering::SeqCst) + 1;
                lock_ignore_poison(&state.delivered).push(tag);

                let acker: Option<Arc<dyn Acker>> = match mode {
                    AckMode::Manual => Some(Arc::new(MemoryAcker {
                        state: Arc::clone(&state),
                        permit: Mutex::new(permit),
                    })),
                    AckMode::Auto => None,
                };

                let delivery = Delivery::new(tag, msg.body, msg.props, acker);
                if out_tx.send(delivery).await.is_err() {
                    break;
                }
            }

            log_debug!("[{session}] consumer for {queue_name} stopped");
        });

        lock_ignore_poison(&self.consumers).push(handle);

        log_debug!("[{}] consuming {queue} ({mode:?}, prefetch {prefetch})", self.name);
        Ok(Consumer::new(out_rx))
    }

    async fn publish(&self, routing_key: &str, props: Properties, body: Bytes) -> Result<()> {
        // ---
        self.ensure_open()?;

        if self.state.fail_publishes.load(Ordering::SeqCst) {
            return Err(RpcError::Transport(format!(
                "publish failed: broker rejected message for {routing_key}"
            )));
        }

        let queues = lock_ignore_poison(&self.state.queues);
        match queues.get(routing_key) {
            Some(entry) => {
                // The receiver lives in the queue entry or in its consumer's reader.
                let _ = entry.tx.send(Message { body, props });
            }
            None => {
                log_debug!("[{}] no queue {routing_key}, message dropped", self.name);
            }
        }

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // ---
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let consumers: Vec<JoinHandle<()>> = lock_ignore_poison(&self.consumers).drain(..).collect();
        for handle in consumers {
            handle.abort();
            // Aborted tasks are dropped by the time the join resolves, which
            // returns their queue receivers.
            let _ = handle.await;
        }

        let owned: Vec<String> = lock_ignore_poison(&self.owned_queues).drain(..).collect();
        let mut queues = lock_ignore_poison(&self.state.queues);
        for name in owned {
            let drop_it = queues
                .get(&name)
                .map(|q| q.exclusive_owner == Some(self.id) || q.auto_delete)
                .unwrap_or(false);
            if drop_it {
                queues.remove(&name);
            }
        }

        log_info!("[{}] memory session closed", self.name);
        Ok(())
    }
}
