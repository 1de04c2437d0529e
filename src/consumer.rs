//! Stream Consumer — component F. One consumer per worker process, reading
//! a tier's subscribed queues in strict priority order from a Redis-protocol
//! stream broker with consumer groups (spec.md §4.F, §6).
//!
//! Grounded on the queue-polling shape of `src/layer4/src/scheduler.rs` in
//! the teacher repo (it polls an in-process `BinaryHeap` by priority; this
//! generalizes the same "always serve the highest tier with anything
//! available" discipline to an external broker), wired to the `redis`
//! crate's streams/consumer-group support already present in the teacher's
//! `Cargo.toml`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadOptions, StreamReadReply,
};
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::CoreError;
use crate::task::Tier;

/// One undecoded unit of work pulled off the broker. The Consumer "does not
/// decode payload semantics; it only extracts `task_id` and the serialized
/// body" (spec.md §4.F step 2).
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub queue: String,
    pub message_id: String,
    pub task_id: String,
    pub body: String,
}

/// Abstraction over the broker so the Consumer can be driven by a live Redis
/// stream in production and an in-memory fake in tests (spec.md §8's "no
/// live broker needed for unit-level coverage").
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Idempotently ensures the consumer group exists on `queue`, creating
    /// the stream if absent.
    async fn ensure_group(&self, queue: &str, group: &str) -> Result<(), CoreError>;

    /// Reads up to `count` new (never-before-delivered) entries from each of
    /// `queues`, blocking up to `block` if none are immediately available.
    /// Entries are returned queue-by-queue in the order `queues` was given,
    /// preserving priority (spec.md §4.F step 1, P6).
    async fn read_new(
        &self,
        queues: &[String],
        group: &str,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> Result<Vec<BrokerMessage>, CoreError>;

    /// Claims entries left in the pending-entries list under `consumer`'s
    /// own name from a previous, crashed run of this worker, and reassigns
    /// them to the current connection (crash recovery, spec.md §4.F
    /// "Pending-entries recovery").
    async fn claim_pending(
        &self,
        queues: &[String],
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<BrokerMessage>, CoreError>;

    async fn ack(&self, queue: &str, group: &str, message_id: &str) -> Result<(), CoreError>;
}

/// Redis(-protocol)-backed implementation using consumer groups.
pub struct RedisBrokerConnection {
    conn: ConnectionManager,
}

impl RedisBrokerConnection {
    pub async fn connect(host: &str, port: u16, db: i64) -> Result<Self, CoreError> {
        let url = format!("redis://{host}:{port}/{db}");
        let client = redis::Client::open(url).map_err(CoreError::Broker)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(CoreError::Broker)?;
        Ok(Self { conn })
    }

    pub fn from_connection_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn parse_reply(reply: Option<StreamReadReply>) -> Vec<BrokerMessage> {
        let Some(reply) = reply else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for stream_key in reply.keys {
            for entry in &stream_key.ids {
                out.push(BrokerMessage {
                    queue: stream_key.key.clone(),
                    message_id: entry.id.clone(),
                    task_id: field(entry, "task_id"),
                    body: field(entry, "body"),
                });
            }
        }
        out
    }
}

/// Extracts a string field out of a stream entry's key/value map, matching
/// either the bulk-string or simple-string wire encoding.
fn field(entry: &StreamId, name: &str) -> String {
    entry
        .map
        .get(name)
        .and_then(|v| match v {
            redis::Value::Data(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            redis::Value::Status(s) => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

#[async_trait]
impl BrokerConnection for RedisBrokerConnection {
    async fn ensure_group(&self, queue: &str, group: &str) -> Result<(), CoreError> {
        let mut conn = self.conn.clone();
        let result: Result<(), redis::RedisError> =
            conn.xgroup_create_mkstream(queue, group, "0").await;
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.to_string().contains("BUSYGROUP") => Ok(()),
            Err(err) => Err(CoreError::Broker(err)),
        }
    }

    async fn read_new(
        &self,
        queues: &[String],
        group: &str,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> Result<Vec<BrokerMessage>, CoreError> {
        let mut conn = self.conn.clone();
        let opts = StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(block.as_millis() as usize);
        let ids: Vec<&str> = queues.iter().map(|_| ">").collect();
        let reply: Option<StreamReadReply> =
            conn.xread_options(queues, &ids, &opts).await.map_err(CoreError::Broker)?;
        Ok(Self::parse_reply(reply))
    }

    async fn claim_pending(
        &self,
        queues: &[String],
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<BrokerMessage>, CoreError> {
        let mut out = Vec::new();
        for queue in queues {
            let mut conn = self.conn.clone();
            // List every entry still parked under our own consumer name from
            // a previous, crashed run, then re-claim them (min-idle-time 0)
            // to fetch their field data back.
            let pending: StreamPendingCountReply = conn
                .xpending_consumer_count(queue, group, "-", "+", count, consumer)
                .await
                .map_err(CoreError::Broker)?;
            let ids: Vec<String> = pending.ids.into_iter().map(|p| p.id).collect();
            if ids.is_empty() {
                continue;
            }
            let reply: StreamClaimReply = conn
                .xclaim(queue, group, consumer, 0, &ids)
                .await
                .map_err(CoreError::Broker)?;
            for entry in reply.ids {
                let body = field(&entry, "body");
                let task_id = field(&entry, "task_id");
                out.push(BrokerMessage {
                    queue: queue.clone(),
                    message_id: entry.id,
                    task_id,
                    body,
                });
            }
        }
        Ok(out)
    }

    async fn ack(&self, queue: &str, group: &str, message_id: &str) -> Result<(), CoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(queue, group, &[message_id]).await.map_err(CoreError::Broker)?;
        Ok(())
    }
}

/// In-memory broker double for tests. Each call to [`push`](Self::push)
/// appends to the named queue; `read_new` drains in FIFO order and tracks
/// unacked entries so `claim_pending` can replay them, mirroring a Redis
/// consumer group closely enough for consumer-loop tests that never stand
/// up a real broker.
#[derive(Default)]
pub struct FakeBroker {
    queues: Mutex<std::collections::HashMap<String, VecDeque<BrokerMessage>>>,
    pending: Mutex<std::collections::HashMap<String, BrokerMessage>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl FakeBroker {
    pub async fn push(&self, queue: &str, task_id: &str, body: &str) {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            .to_string();
        let message = BrokerMessage {
            queue: queue.to_string(),
            message_id: id,
            task_id: task_id.to_string(),
            body: body.to_string(),
        };
        let mut queues = self.queues.lock().await;
        queues.entry(queue.to_string()).or_default().push_back(message);
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[async_trait]
impl BrokerConnection for FakeBroker {
    async fn ensure_group(&self, _queue: &str, _group: &str) -> Result<(), CoreError> {
        Ok(())
    }

    async fn read_new(
        &self,
        queues: &[String],
        _group: &str,
        _consumer: &str,
        _block: Duration,
        count: usize,
    ) -> Result<Vec<BrokerMessage>, CoreError> {
        let mut out = Vec::new();
        let mut held = self.queues.lock().await;
        let mut pending = self.pending.lock().await;
        for queue in queues {
            if out.len() >= count {
                break;
            }
            if let Some(deque) = held.get_mut(queue) {
                while out.len() < count {
                    let Some(message) = deque.pop_front() else { break };
                    pending.insert(message.message_id.clone(), message.clone());
                    out.push(message);
                }
            }
        }
        Ok(out)
    }

    async fn claim_pending(
        &self,
        queues: &[String],
        _group: &str,
        _consumer: &str,
        _count: usize,
    ) -> Result<Vec<BrokerMessage>, CoreError> {
        let pending = self.pending.lock().await;
        Ok(pending
            .values()
            .filter(|m| queues.contains(&m.queue))
            .cloned()
            .collect())
    }

    async fn ack(&self, _queue: &str, _group: &str, message_id: &str) -> Result<(), CoreError> {
        let mut pending = self.pending.lock().await;
        pending.remove(message_id);
        Ok(())
    }
}

/// Polls a single tier's subscribed queues in priority order, and tracks
/// the consumer-group identity (`worker_id` doubling as the consumer name
/// within `crawler_<tier>`, spec.md §4.F/§6).
pub struct StreamConsumer {
    broker: Arc<dyn BrokerConnection>,
    tier: Tier,
    worker_id: String,
    block: Duration,
}

const DEFAULT_BLOCK: Duration = Duration::from_secs(2);
const READ_BATCH: usize = 16;

impl StreamConsumer {
    pub fn new(broker: Arc<dyn BrokerConnection>, tier: Tier, worker_id: impl Into<String>) -> Self {
        Self {
            broker,
            tier,
            worker_id: worker_id.into(),
            block: DEFAULT_BLOCK,
        }
    }

    pub fn group(&self) -> String {
        self.tier.consumer_group()
    }

    /// Ensures every subscribed queue has the tier's consumer group,
    /// creating streams that don't exist yet.
    pub async fn init(&self) -> Result<(), CoreError> {
        let group = self.group();
        for queue in self.tier.queues() {
            self.broker.ensure_group(&queue, &group).await?;
        }
        Ok(())
    }

    /// Replays this worker's own pending entries left over from a previous
    /// crash, before entering the normal read loop (spec.md §4.F).
    pub async fn recover_pending(&self) -> Result<Vec<BrokerMessage>, CoreError> {
        let queues = self.tier.queues();
        let group = self.group();
        let messages = self
            .broker
            .claim_pending(&queues, &group, &self.worker_id, READ_BATCH)
            .await?;
        if !messages.is_empty() {
            info!(count = messages.len(), worker_id = %self.worker_id, "recovered pending entries from previous run");
        }
        Ok(messages)
    }

    /// One poll cycle: blocks up to `block` waiting for new entries across
    /// the tier's queues, in priority order.
    pub async fn poll_once(&self) -> Result<Vec<BrokerMessage>, CoreError> {
        let queues = self.tier.queues();
        let group = self.group();
        self.broker
            .read_new(&queues, &group, &self.worker_id, self.block, READ_BATCH)
            .await
    }

    /// Acks a message on terminal outcome (success or terminal failure).
    /// Transient failures are left un-acked deliberately — the broker's
    /// visibility timeout redelivers them (spec.md §4.F step 3).
    pub async fn ack(&self, message: &BrokerMessage) {
        let group = self.group();
        if let Err(err) = self.broker.ack(&message.queue, &group, &message.message_id).await {
            warn!(error = %err, message_id = %message.message_id, "failed to ack message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn priority_ordering_serves_higher_tier_queue_first() {
        let broker = Arc::new(FakeBroker::default());
        broker.push("crawler_realtime_normal", "t-low", "{}").await;
        broker.push("crawler_backfill_normal", "t-high", "{}").await;

        let consumer = StreamConsumer::new(broker, Tier::Normal, "worker-1");
        consumer.init().await.unwrap();
        let messages = consumer.poll_once().await.unwrap();

        assert_eq!(messages[0].task_id, "t-high");
        assert_eq!(messages[1].task_id, "t-low");
    }

    #[tokio::test]
    async fn ack_removes_message_from_pending() {
        let broker = Arc::new(FakeBroker::default());
        broker.push("crawler_backfill_normal", "t1", "{}").await;

        let consumer = StreamConsumer::new(broker.clone(), Tier::Normal, "worker-1");
        let messages = consumer.poll_once().await.unwrap();
        assert_eq!(broker.pending_count().await, 1);

        consumer.ack(&messages[0]).await;
        assert_eq!(broker.pending_count().await, 0);
    }

    #[tokio::test]
    async fn recover_pending_replays_unacked_entries_after_restart() {
        let broker = Arc::new(FakeBroker::default());
        broker.push("crawler_backfill_critical", "t1", "{}").await;

        let consumer = StreamConsumer::new(broker.clone(), Tier::Critical, "worker-1");
        let _ = consumer.poll_once().await.unwrap();
        // Simulate a crash: a fresh consumer restarts without having acked.
        let restarted = StreamConsumer::new(broker, Tier::Critical, "worker-1");
        let recovered = restarted.recover_pending().await.unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].task_id, "t1");
    }
}
