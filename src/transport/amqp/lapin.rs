//! AMQP session implementation using `lapin`.
//!
//! ## Concurrency model
//!
//! A single background **actor task** owns the AMQP connection and channel
//! and serves declare, qos, consume, publish and close commands one at a
//! time. No other task touches the channel directly, which lets the session
//! be shared (`Send + Sync`) between the dispatch loop and the handler tasks
//! that publish replies.
//!
//! Each consumer gets its own forwarding task that turns lapin deliveries
//! into domain [`Delivery`] values. Manual-ack deliveries carry lapin's own
//! acker, so acknowledging does not go through the actor.
//!
//! ## Queue semantics
//!
//! Queues are never durable. Exclusivity and auto-delete follow the
//! [`QueueOptions`] passed by the caller. Publishing always targets the
//! default exchange with the queue name as routing key.

use lapin::{
    //
    acker::Acker as LapinDeliveryAcker,
    message::Delivery as LapinDelivery,
    options::{
        //
        BasicAckOptions,
        BasicConsumeOptions,
        BasicPublishOptions,
        BasicQosOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties,
    Channel,
    Connection,
    ConnectionProperties,
};

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::{
    //
    log_debug,
    log_error,
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

//
// Actor commands
//

enum Cmd {
    //
    Declare {
        name: String,
        opts: QueueOptions,
        resp: oneshot::Sender<Result<Queue>>,
    },
    Qos {
        count: u16,
        resp: oneshot::Sender<Result<()>>,
    },
    Consume {
        queue: Queue,
        mode: AckMode,
        resp: oneshot::Sender<Result<Consumer>>,
    },
    Publish {
        routing_key: String,
        props: Properties,
        body: Bytes,
        resp: oneshot::Sender<Result<()>>,
    },
    Close {
        resp: oneshot::Sender<Result<()>>,
    },
}

/// AMQP session backed by one lapin connection and channel.
struct LapinSession {
    // ---
    session_id: String,
    cmd_tx: mpsc::Sender<Cmd>,
    actor: Mutex<Option<JoinHandle<()>>>,
}

impl LapinSession {
    fn create(session_id: &str, connection: Connection, channel: Channel) -> SessionPtr {
        // ---
        let (cmd_tx, cmd_rx) = mpsc::channel(16);

        let actor = Actor {
            session_id: session_id.to_string(),
            connection,
            channel,
            cmd_rx,
            consumers: Vec::new(),
        };

        let handle = tokio::spawn(actor.run());

        Arc::new(Self {
            session_id: session_id.to_string(),
            cmd_tx,
            actor: Mutex::new(Some(handle)),
        })
    }

    async fn call<T>(&self, cmd: Cmd, rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        // ---
        self.cmd_tx.send(cmd).await.map_err(|e| {
            RpcError::Transport(format!("amqp: actor command channel closed: {e}"))
        })?;

        rx.await.map_err(|e| {
            RpcError::Transport(format!("amqp: actor dropped the response: {e}"))
        })?
    }
}

/// Background actor task that owns the AMQP connection and channel.
struct Actor {
    // ---
    session_id: String,
    connection: Connection,
    channel: Channel,
    cmd_rx: mpsc::Receiver<Cmd>,
    consumers: Vec<JoinHandle<()>>,
}

impl Actor {
    async fn run(mut self) {
        // ---
        log_info!("[{}] AMQP actor started", self.session_id);

        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                Cmd::Declare { name, opts, resp } => {
                    let _ = resp.send(self.do_declare(&name, opts).await);
                }
                Cmd::Qos { count, resp } => {
                    let _ = resp.send(self.do_qos(count).await);
                }
                Cmd::Consume { queue, mode, resp } => {
                    let _ = resp.send(self.do_consume(queue, mode).await);
                }
                Cmd::Publish {
                    routing_key,
                    props,
                    body,
                    resp,
                } => {
                    let _ = resp.send(self.do_publish(&routing_key, props, body).await);
                }
                Cmd::Close { resp } => {
                    self.cmd_rx.close();
                    let _ = resp.send(self.shutdown().await);
                    return;
                }
            }
        }

        // Every session handle dropped without close().
        let _ = self.shutdown().await;
    }

    async fn shutdown(&mut self) -> Result<()> {
        // ---
        for handle in self.consumers.drain(..) {
            handle.abort();
        }

        let channel = self.channel.close(200, "Normal shutdown").await;
        let connection = self.connection.close(200, "Normal shutdown").await;

        log_info!("[{}] AMQP actor stopped", self.session_id);

        channel
            .and(connection)
            .map_err(|e| RpcError::Transport(format!("amqp: close failed: {e}")))
    }

    async fn do_declare(&mut self, name: &str, opts: QueueOptions) -> Result<Queue> {
        // ---
        let declare_opts = QueueDeclareOptions {
            passive: false,
            durable: false,
            exclusive: opts.exclusive,
            auto_delete: opts.auto_delete,
            nowait: false,
        };

        let queue = self
            .channel
            .queue_declare(name, declare_opts, FieldTable::default())
            .await
            .map_err(|e| RpcError::Transport(format!("amqp: queue declare failed: {e}")))?;

        log_info!("[{}] Declared queue: {}", self.session_id, queue.name());
        Ok(Queue::new(queue.name().as_str()))
    }

    async fn do_qos(&mut self, count: u16) -> Result<()> {
        // ---
        self.channel
            .basic_qos(count, BasicQosOptions::default())
            .await
            .map_err(|e| RpcError::Transport(format!("amqp: qos failed: {e}")))
    }

    async fn do_consume(&mut self, queue: Queue, mode: AckMode) -> Result<Consumer> {
        // ---
        let consume_opts = BasicConsumeOptions {
            no_ack: mode == AckMode::Auto,
            ..BasicConsumeOptions::default()
        };

        let mut consumer = self
            .channel
            .basic_consume(
                queue.name(),
                &format!("{}-consumer", self.session_id),
                consume_opts,
                FieldTable::default(),
            )
            .await
            .map_err(|e| RpcError::Transport(format!("amqp: consume failed: {e}")))?;

        log_info!("[{}] Started consuming queue: {queue}", self.session_id);

        let (tx, rx) = mpsc::channel(16);
        let session_id = self.session_id.clone();

        let handle = tokio::spawn(async move {
            use futures_lite::stream::StreamExt;

            while let Some(delivery_result) = consumer.next().await {
                match delivery_result {
                    Ok(delivery) => {
                        log_debug!("[{session_id}] Received message on queue: {queue}");
                        if tx.send(convert_delivery(delivery, mode)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log_error!("[{session_id}] Consumer error on {queue}: {e}");
                        break;
                    }
                }
            }

            log_info!("[{session_id}] Consumer task ended for queue: {queue}");
        });

        self.consumers.push(handle);
        Ok(Consumer::new(rx))
    }

    async fn do_publish(&mut self, routing_key: &str, props: Properties, body: Bytes) -> Result<()> {
        // ---
        let mut properties = BasicProperties::default();
        if let Some(content_type) = props.content_type.as_deref() {
            properties = properties.with_content_type(content_type.into());
        }
        if let Some(correlation_id) = props.correlation_id.as_deref() {
            properties = properties.with_correlation_id(correlation_id.into());
        }
        if let Some(reply_to) = props.reply_to.as_deref() {
            properties = properties.with_reply_to(reply_to.into());
        }

        self.channel
            .basic_publish(
                "", // default exchange
                routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await
            .map_err(|e| RpcError::Transport(format!("amqp: publish failed: {e}")))?;

        log_debug!("[{}] Published to queue: {routing_key}", self.session_id);
        Ok(())
    }
}

/// Acknowledges one lapin delivery.
struct LapinAcker(LapinDeliveryAcker);

#[async_trait::async_trait]
impl Acker for LapinAcker {
    async fn ack(&self, delivery_tag: u64) -> Result<()> {
        // ---
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| RpcError::Transport(format!("amqp: ack of {delivery_tag} failed: {e}")))
    }
}

fn convert_delivery(delivery: LapinDelivery, mode: AckMode) -> Delivery {
    // ---
    let short = |s: &Option<lapin::types::ShortString>| s.as_ref().map(|v| Arc::from(v.as_str()));

    let properties = Properties {
        content_type: short(delivery.properties.content_type()),
        correlation_id: short(delivery.properties.correlation_id()),
        reply_to: short(delivery.properties.reply_to()),
    };

    let acker: Option<Arc<dyn Acker>> = match mode {
        AckMode::Manual => Some(Arc::new(LapinAcker(delivery.acker))),
        AckMode::Auto => None,
    };

    Delivery::new(
        delivery.delivery_tag,
        Bytes::from(delivery.data),
        properties,
        acker,
    )
}

#[async_trait::async_trait]
impl Session for LapinSession {
    // ---
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn declare_queue(&self, name: &str, opts: QueueOptions) -> Result<Queue> {
        // ---
        let (resp, rx) = oneshot::channel();
        let cmd = Cmd::Declare {
            name: name.to_string(),
            opts,
            resp,
        };
        self.call(cmd, rx).await
    }

    async fn set_prefetch(&self, count: u16) -> Result<()> {
        // ---
        let (resp, rx) = oneshot::channel();
        self.call(Cmd::Qos { count, resp }, rx).await
    }

    async fn consume(&self, queue: &Queue, mode: AckMode) -> Result<Consumer> {
        // ---
        let (resp, rx) = oneshot::channel();
        let cmd = Cmd::Consume {
            queue: queue.clone(),
            mode,
            resp,
        };
        self.call(cmd, rx).await
    }

    async fn publish(&self, routing_key: &str, props: Properties, body: Bytes) -> Result<()> {
        // ---
        let (resp, rx) = oneshot::channel();
        let cmd = Cmd::Publish {
            routing_key: routing_key.to_string(),
            props,
            body,
            resp,
        };
        self.call(cmd, rx).await
    }

    async fn close(&self) -> Result<()> {
        // ---
        let Some(handle) = self.actor.lock().await.take() else {
            return Ok(());
        };

        let (resp, rx) = oneshot::channel();
        let result = self.call(Cmd::Close { resp }, rx).await;
        let _ = handle.await;
        result
    }
}

/// Connect to an AMQP broker and open a session.
///
/// # Errors
///
/// Returns [`RpcError::Transport`] if the connection or the channel cannot
/// be established.
pub async fn connect(uri: &str, session_id: &str) -> Result<SessionPtr> {
    // ---
    log_info!("Connecting to AMQP broker: {uri}");

    let connection = Connection::connect(uri, ConnectionProperties::default())
        .await
        .map_err(|e| {
            let msg = format!("amqp: connection failed: {e}");
            log_error!("{msg}");
            RpcError::Transport(msg)
        })?;

    let channel = connection.create_channel().await.map_err(|e| {
        let msg = format!("amqp: channel creation failed: {e}");
        log_error!("{msg}");
        RpcError::Transport(msg)
    })?;

    log_info!("Connected to AMQP broker");

    Ok(LapinSession::create(session_id, connection, channel))
}
