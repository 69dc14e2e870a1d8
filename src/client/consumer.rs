use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::api::ClientError;
use crate::core::sse::EventStream;

/// Opens the event stream of one job.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn open(&self, job_id: &str) -> Result<EventStream, ClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Error,
    Closed,
}

#[derive(Debug)]
pub enum StreamSignal {
    Data(String),
    Failed(String),
    Ended,
}

/// Posted by a connection task; `generation` identifies the connection it came from.
#[derive(Debug)]
pub struct ConsumerEvent {
    generation: u64,
    signal: StreamSignal,
}

/// What the owner should do with an event after [`StreamingConsumer::accept`].
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    Data(String),
    Failed(String),
    Ended,
    Stale,
}

struct Connection {
    job_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the current job id and its connection. At most one connection is live; a new one is
/// only opened after the previous task has finished.
pub struct StreamingConsumer {
    source: Arc<dyn EventSource>,
    tx: mpsc::UnboundedSender<ConsumerEvent>,
    job_id: Option<String>,
    generation: u64,
    state: ConnectionState,
    connection: Option<Connection>,
}

impl StreamingConsumer {
    pub fn new(source: Arc<dyn EventSource>) -> (Self, mpsc::UnboundedReceiver<ConsumerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                source,
                tx,
                job_id: None,
                generation: 0,
                state: ConnectionState::Idle,
                connection: None,
            },
            rx,
        )
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Close any existing connection, then open one for `job_id` if it is set.
    pub async fn set_job_id(&mut self, job_id: Option<String>) {
        self.close().await;
        self.job_id = job_id.clone();
        let Some(job_id) = job_id else {
            return;
        };

        self.generation += 1;
        self.state = ConnectionState::Connecting;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pump(
            self.source.clone(),
            job_id.clone(),
            self.generation,
            self.tx.clone(),
            cancel.clone(),
        ));
        info!("Opening chat updates for job {}", job_id);
        self.connection = Some(Connection {
            job_id,
            cancel,
            handle,
        });
    }

    /// Cancel the live connection and wait for its task to finish. Events it already posted
    /// become stale.
    pub async fn close(&mut self) {
        self.generation += 1;
        if let Some(conn) = self.connection.take() {
            conn.cancel.cancel();
            let _ = conn.handle.await;
            info!("Closed chat updates for job {}", conn.job_id);
            self.state = ConnectionState::Closed;
        }
    }

    /// Check an event against the live connection and advance the state machine.
    pub fn accept(&mut self, event: ConsumerEvent) -> Delivery {
        if event.generation != self.generation || self.connection.is_none() {
            debug!("Discarding event from a closed connection");
            return Delivery::Stale;
        }
        match event.signal {
            StreamSignal::Data(data) => {
                self.state = ConnectionState::Open;
                Delivery::Data(data)
            }
            StreamSignal::Failed(reason) => {
                self.finish(ConnectionState::Error);
                Delivery::Failed(reason)
            }
            StreamSignal::Ended => {
                self.finish(ConnectionState::Closed);
                Delivery::Ended
            }
        }
    }

    // The task has posted its last event and is returning on its own.
    fn finish(&mut self, state: ConnectionState) {
        if let Some(conn) = self.connection.take() {
            conn.cancel.cancel();
            info!("Chat updates for job {} finished ({:?})", conn.job_id, state);
        }
        self.generation += 1;
        self.state = state;
    }
}

impl Drop for StreamingConsumer {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.cancel.cancel();
            conn.handle.abort();
        }
    }
}

async fn pump(
    source: Arc<dyn EventSource>,
    job_id: String,
    generation: u64,
    tx: mpsc::UnboundedSender<ConsumerEvent>,
    cancel: CancellationToken,
) {
    let send = |signal| tx.send(ConsumerEvent { generation, signal }).is_ok();

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        opened = source.open(&job_id) => opened,
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            send(StreamSignal::Failed(e.to_string()));
            return;
        }
    };

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            item = stream.next() => item,
        };
        match item {
            Some(Ok(data)) => {
                if !send(StreamSignal::Data(data)) {
                    return;
                }
            }
            Some(Err(e)) => {
                send(StreamSignal::Failed(e.to_string()));
                return;
            }
            None => {
                send(StreamSignal::Ended);
                return;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    /// What the fake stream does after its scripted events.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub enum Tail {
        End,
        Fail,
        Hold,
    }

    struct OpenGuard {
        job_id: String,
        source: Arc<Shared>,
    }

    impl Drop for OpenGuard {
        fn drop(&mut self) {
            self.source.active.fetch_sub(1, Ordering::SeqCst);
            self.source
                .log
                .lock()
                .unwrap()
                .push(format!("close:{}", self.job_id));
        }
    }

    #[derive(Default)]
    struct Shared {
        active: AtomicUsize,
        max_active: AtomicUsize,
        log: Mutex<Vec<String>>,
        exhausted: Mutex<HashMap<String, Arc<AtomicBool>>>,
    }

    /// Scripted event source that tracks how many streams are open at once.
    #[derive(Default)]
    pub struct FakeSource {
        scripts: Mutex<HashMap<String, (Vec<String>, Tail)>>,
        shared: Arc<Shared>,
    }

    impl FakeSource {
        pub fn script(&self, job_id: &str, events: &[&str], tail: Tail) {
            self.scripts.lock().unwrap().insert(
                job_id.to_string(),
                (events.iter().map(|e| e.to_string()).collect(), tail),
            );
        }

        pub fn max_active(&self) -> usize {
            self.shared.max_active.load(Ordering::SeqCst)
        }

        pub fn active(&self) -> usize {
            self.shared.active.load(Ordering::SeqCst)
        }

        pub fn log(&self) -> Vec<String> {
            self.shared.log.lock().unwrap().clone()
        }

        /// True once every scripted event of `job_id` has been handed to the consumer.
        pub fn exhausted(&self, job_id: &str) -> bool {
            self.shared
                .exhausted
                .lock()
                .unwrap()
                .get(job_id)
                .is_some_and(|flag| flag.load(Ordering::SeqCst))
        }
    }

    #[async_trait]
    impl EventSource for FakeSource {
        async fn open(&self, job_id: &str) -> Result<EventStream, ClientError> {
            let (events, tail) = self
                .scripts
                .lock()
                .unwrap()
                .get(job_id)
                .cloned()
                .unwrap_or((Vec::new(), Tail::End));

            let now = self.shared.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.shared.max_active.fetch_max(now, Ordering::SeqCst);
            self.shared.log.lock().unwrap().push(format!("open:{}", job_id));
            let exhausted = Arc::new(AtomicBool::new(false));
            self.shared
                .exhausted
                .lock()
                .unwrap()
                .insert(job_id.to_string(), exhausted.clone());

            let guard = OpenGuard {
                job_id: job_id.to_string(),
                source: self.shared.clone(),
            };
            Ok(Box::pin(async_stream::stream! {
                let _guard = guard;
                for event in events {
                    yield Ok(event);
                }
                exhausted.store(true, Ordering::SeqCst);
                match tail {
                    Tail::End => {}
                    Tail::Fail => yield Err(std::io::Error::other("connection reset")),
                    Tail::Hold => futures_util::future::pending::<()>().await,
                }
            }))
        }
    }
}
