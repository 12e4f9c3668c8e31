//! Aggregation window manager.
//!
//! Owns every open aggregation bucket. One bucket exists per
//! [`BucketKey`] (subject key + aggregation class); it opens on the first
//! combinable event for that key and closes exactly once, when its deadline
//! timer fires, when an incoming event completes or terminates it, or when the
//! manager is drained at shutdown.
//!
//! ## Concurrency
//!
//! The whole index sits behind one mutex. Each `submit`, timer callback, and
//! drain performs its check-and-mutate sequence inside a single critical
//! section that never awaits. Rendering and delivery happen elsewhere:
//! timer-driven and terminating flushes are sent over an unbounded channel to
//! the flush consumer, and completing flushes are returned to the caller.
//!
//! Ownership is the flush guard. A bucket is flushed by whoever removes it
//! from the index, so a timer that wakes up for a bucket that is gone (or was
//! replaced by a newer bucket with a different [`BucketId`]) does nothing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use events::{
    absorbs_label, admit, build, resolve, Action, Admission, AggregationClass, AggregationWindow,
    BucketId, BucketKey, CompositeEvent, Composition, DeliveryId, NormalizedEvent,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What [`WindowManager::submit`] did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The event does not aggregate; render it now.
    RenderNow(NormalizedEvent),
    /// The event is held in a bucket until the bucket flushes.
    Buffered,
    /// The event closed its bucket; render this composite now.
    Flushed(CompositeEvent),
    /// The event closed its bucket and the run nets out to nothing.
    Suppressed,
}

/// One open bucket.
#[derive(Debug)]
struct Bucket {
    id: BucketId,
    opened_at: Instant,
    deadline: Instant,
    events: Vec<NormalizedEvent>,
    timer: Option<JoinHandle<()>>,
}

impl Bucket {
    fn holds(&self, delivery_id: &DeliveryId) -> bool {
        self.events.iter().any(|e| &e.delivery_id == delivery_id)
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[derive(Debug, Default)]
struct Index {
    buckets: HashMap<BucketKey, Bucket>,
    /// Set by `drain`; afterwards nothing is buffered.
    closed: bool,
}

/// What `submit` decided while inspecting the index.
enum Step {
    Open,
    Duplicate,
    Append,
    Complete,
    /// Flush the existing bucket through the channel, then open a new one.
    Replace,
}

#[derive(Debug)]
struct Inner {
    window: AggregationWindow,
    index: Mutex<Index>,
    flushes: mpsc::UnboundedSender<Composition>,
    next_id: AtomicU64,
}

/// Per-subject, per-class, timer-driven event buffer.
///
/// Cheap to clone; clones share the same index.
#[derive(Debug, Clone)]
pub struct WindowManager {
    inner: Arc<Inner>,
}

impl WindowManager {
    /// Creates a manager and the receiving end of its flush channel.
    ///
    /// Every flush that is not returned directly from [`submit`](Self::submit)
    /// arrives on the receiver.
    pub fn new(window: AggregationWindow) -> (Self, mpsc::UnboundedReceiver<Composition>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            window,
            index: Mutex::new(Index::default()),
            flushes: tx,
            next_id: AtomicU64::new(1),
        });
        (Self { inner }, rx)
    }

    /// Routes one event through aggregation.
    ///
    /// Must be called from within a Tokio runtime; opening a bucket spawns
    /// its deadline timer.
    pub fn submit(&self, event: NormalizedEvent) -> Outcome {
        let Some(delay) = self.inner.window.delay() else {
            return Outcome::RenderNow(event);
        };
        let key = resolve(&event);
        if !key.class.is_combinable() {
            return Outcome::RenderNow(event);
        }

        let now = Instant::now();
        let mut index = self.inner.index.lock();

        if index.closed {
            drop(index);
            debug!(bucket = %key, "Window manager drained; flushing single event");
            return into_outcome(build(key, std::slice::from_ref(&event)));
        }

        if key.class == AggregationClass::Label && event.is(&Action::Labeled) {
            let opened = BucketKey::new(key.subject_key.clone(), AggregationClass::Opened);
            if let Some(bucket) = index.buckets.get_mut(&opened) {
                if bucket.holds(&event.delivery_id) {
                    debug!(
                        bucket = %opened,
                        delivery_id = %event.delivery_id,
                        "Redelivered event ignored"
                    );
                    return Outcome::Buffered;
                }
                if bucket.deadline > now && absorbs_label(&bucket.events, &event) {
                    debug!(
                        bucket = %opened,
                        delivery_id = %event.delivery_id,
                        "Label absorbed by opened subject"
                    );
                    bucket.events.push(event);
                    return Outcome::Buffered;
                }
            }
        }

        let step = match index.buckets.get(&key) {
            None => Step::Open,
            Some(bucket) if bucket.holds(&event.delivery_id) => Step::Duplicate,
            Some(bucket) if bucket.deadline <= now => Step::Replace,
            Some(bucket) => match admit(key.class, &bucket.events, &event) {
                Admission::Append => Step::Append,
                Admission::Complete => Step::Complete,
                Admission::Terminate => Step::Replace,
            },
        };

        match step {
            Step::Duplicate => {
                debug!(
                    bucket = %key,
                    delivery_id = %event.delivery_id,
                    "Redelivered event ignored"
                );
                Outcome::Buffered
            }
            Step::Append => {
                if let Some(bucket) = index.buckets.get_mut(&key) {
                    bucket.events.push(event);
                }
                Outcome::Buffered
            }
            Step::Complete => {
                let Some(mut bucket) = index.buckets.remove(&key) else {
                    return Outcome::Buffered;
                };
                drop(index);
                bucket.cancel_timer();
                bucket.events.push(event);
                debug!(bucket = %key, bucket_id = %bucket.id, "Bucket complete; flushing now");
                into_outcome(build(key, &bucket.events))
            }
            Step::Replace => {
                if let Some(mut old) = index.buckets.remove(&key) {
                    old.cancel_timer();
                    self.inner.emit(key.clone(), old);
                }
                self.open(&mut index, key, event, now, delay);
                Outcome::Buffered
            }
            Step::Open => {
                self.open(&mut index, key, event, now, delay);
                Outcome::Buffered
            }
        }
    }

    fn open(
        &self,
        index: &mut Index,
        key: BucketKey,
        event: NormalizedEvent,
        now: Instant,
        delay: std::time::Duration,
    ) {
        let id = BucketId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let deadline = now + delay;
        let timer = spawn_timer(Arc::downgrade(&self.inner), key.clone(), id, deadline);
        debug!(bucket = %key, bucket_id = %id, ?delay, "Bucket opened");
        index.buckets.insert(
            key,
            Bucket {
                id,
                opened_at: now,
                deadline,
                events: vec![event],
                timer: Some(timer),
            },
        );
    }

    /// Deadline callback: flushes `key` if its open bucket is still `id`.
    ///
    /// Returns `false` (and does nothing) when the bucket was already flushed
    /// by another path. Safe to call any number of times.
    pub fn fire(&self, key: &BucketKey, id: BucketId) -> bool {
        self.inner.fire(key, id)
    }

    /// Flushes every open bucket in deadline order and stops buffering.
    ///
    /// Returns the number of buckets flushed. After this call `submit` never
    /// buffers; combinable events flush as single-event composites.
    pub fn drain(&self) -> usize {
        let mut index = self.inner.index.lock();
        index.closed = true;
        let mut open: Vec<(BucketKey, Bucket)> = index.buckets.drain().collect();
        open.sort_by_key(|(_, bucket)| bucket.deadline);

        let count = open.len();
        for (key, mut bucket) in open {
            bucket.cancel_timer();
            self.inner.emit(key, bucket);
        }
        info!(buckets = count, "Aggregation windows drained");
        count
    }

    /// Id of the open bucket for `key`, if any.
    pub fn bucket_id(&self, key: &BucketKey) -> Option<BucketId> {
        self.inner.index.lock().buckets.get(key).map(|b| b.id)
    }

    /// Number of open buckets.
    pub fn open_buckets(&self) -> usize {
        self.inner.index.lock().buckets.len()
    }

    pub fn window(&self) -> AggregationWindow {
        self.inner.window
    }
}

impl Inner {
    fn fire(&self, key: &BucketKey, id: BucketId) -> bool {
        let mut index = self.index.lock();
        let current = index.buckets.get(key).map(|b| b.id);
        if current != Some(id) {
            debug!(bucket = %key, bucket_id = %id, "Timer fired for a bucket already flushed");
            return false;
        }
        let Some(mut bucket) = index.buckets.remove(key) else {
            return false;
        };
        // The running timer is this call's own task; detach instead of aborting.
        bucket.timer = None;
        self.emit(key.clone(), bucket);
        true
    }

    /// Builds the bucket's composite and hands it to the flush consumer.
    fn emit(&self, key: BucketKey, bucket: Bucket) {
        debug!(
            bucket = %key,
            bucket_id = %bucket.id,
            events = bucket.events.len(),
            open_for = ?bucket.opened_at.elapsed(),
            "Bucket flushed"
        );
        let composition = build(key, &bucket.events);
        if self.flushes.send(composition).is_err() {
            warn!(bucket_id = %bucket.id, "Flush consumer gone; composite dropped");
        }
    }
}

fn spawn_timer(
    inner: Weak<Inner>,
    key: BucketKey,
    id: BucketId,
    deadline: Instant,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        if let Some(inner) = inner.upgrade() {
            inner.fire(&key, id);
        }
    })
}

fn into_outcome(composition: Composition) -> Outcome {
    match composition {
        Composition::Built(composite) => Outcome::Flushed(composite),
        Composition::Suppressed { .. } => Outcome::Suppressed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use events::{
        CompositeKind, EventFacts, EventType, Label, RepositoryName, SubjectKey, Timestamp, UserId,
    };
    use serde_json::Value;

    fn event(
        event_type: EventType,
        action: Action,
        subject: &str,
        sender: u64,
        delivery: &str,
    ) -> NormalizedEvent {
        NormalizedEvent {
            event_type,
            action: Some(action),
            subject_key: SubjectKey::new(subject).unwrap(),
            repo_id: RepositoryName::new("octo/widgets").unwrap(),
            occurred_at: Timestamp::now(),
            sender_id: Some(UserId::new(sender)),
            delivery_id: DeliveryId::new(delivery).unwrap(),
            facts: EventFacts::default(),
            raw: Value::Null,
        }
    }

    fn labeled(name: &str, delivery: &str) -> NormalizedEvent {
        let mut evt = event(EventType::Issues, Action::Labeled, "octo/widgets#1", 1, delivery);
        evt.facts.label = Some(Label::new(name, "ededed"));
        evt
    }

    fn manager() -> (WindowManager, mpsc::UnboundedReceiver<Composition>) {
        WindowManager::new(AggregationWindow::Fixed(Duration::from_secs(1)))
    }

    #[tokio::test(start_paused = true)]
    async fn redelivered_event_is_collapsed() {
        let (windows, mut rx) = manager();
        assert_eq!(windows.submit(labeled("bug", "d-1")), Outcome::Buffered);
        assert_eq!(windows.submit(labeled("bug", "d-1")), Outcome::Buffered);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let Some(Composition::Built(composite)) = rx.recv().await else {
            panic!("expected a composite");
        };
        assert_eq!(composite.delivery_ids.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_bucket_is_replaced_when_timer_lags() {
        let (windows, mut rx) = manager();
        let key = resolve(&labeled("bug", "d-1"));
        windows.submit(labeled("bug", "d-1"));
        let first = windows.bucket_id(&key).unwrap();

        // Move the clock past the deadline without yielding to the timer task.
        tokio::time::advance(Duration::from_millis(1500)).await;
        windows.submit(labeled("urgent", "d-2"));
        let second = windows.bucket_id(&key).unwrap();
        assert_ne!(first, second);

        let Some(Composition::Built(old)) = rx.recv().await else {
            panic!("expected the expired bucket");
        };
        assert_eq!(old.delivery_ids, vec![DeliveryId::new("d-1").unwrap()]);
        assert!(!windows.fire(&key, first));
    }

    #[tokio::test(start_paused = true)]
    async fn comment_then_close_flushes_immediately() {
        let (windows, _rx) = manager();
        let mut comment = event(
            EventType::IssueComment,
            Action::Created,
            "octo/widgets#9",
            7,
            "d-1",
        );
        comment.facts.comment_id = Some(events::CommentId::new(55));
        let close = event(EventType::Issues, Action::Closed, "octo/widgets#9", 7, "d-2");

        assert_eq!(windows.submit(comment), Outcome::Buffered);
        let Outcome::Flushed(composite) = windows.submit(close) else {
            panic!("expected an immediate flush");
        };
        assert_eq!(
            composite.kind,
            CompositeKind::CommentState {
                closed: true,
                reopened: false
            }
        );
        assert_eq!(windows.open_buckets(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_comment_terminates_the_first_bucket() {
        let (windows, mut rx) = manager();
        let first = event(EventType::IssueComment, Action::Created, "octo/widgets#9", 7, "d-1");
        let second = event(EventType::IssueComment, Action::Created, "octo/widgets#9", 7, "d-2");

        windows.submit(first);
        assert_eq!(windows.submit(second), Outcome::Buffered);

        let Some(Composition::Built(flushed)) = rx.recv().await else {
            panic!("expected the first comment to flush");
        };
        assert_eq!(flushed.delivery_ids, vec![DeliveryId::new("d-1").unwrap()]);
        assert_eq!(windows.open_buckets(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn label_present_at_open_is_absorbed() {
        let (windows, mut rx) = manager();
        let mut opened = event(EventType::Issues, Action::Opened, "octo/widgets#1", 1, "d-1");
        opened.facts.subject_labels = vec![Label::new("bug", "ededed")];

        windows.submit(opened);
        assert_eq!(windows.submit(labeled("bug", "d-2")), Outcome::Buffered);
        assert_eq!(windows.open_buckets(), 1);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let Some(Composition::Built(composite)) = rx.recv().await else {
            panic!("expected the opened composite");
        };
        assert_eq!(composite.key.class, AggregationClass::Opened);
        assert_eq!(composite.delivery_ids.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn redelivered_absorbed_label_is_collapsed() {
        let (windows, mut rx) = manager();
        let mut opened = event(EventType::Issues, Action::Opened, "octo/widgets#1", 1, "d-1");
        opened.facts.subject_labels = vec![Label::new("bug", "ededed")];

        windows.submit(opened);
        assert_eq!(windows.submit(labeled("bug", "d-2")), Outcome::Buffered);
        assert_eq!(windows.submit(labeled("bug", "d-2")), Outcome::Buffered);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let Some(Composition::Built(composite)) = rx.recv().await else {
            panic!("expected the opened composite");
        };
        assert_eq!(
            composite.delivery_ids,
            vec![DeliveryId::new("d-1").unwrap(), DeliveryId::new("d-2").unwrap()]
        );
        assert_eq!(
            composite.kind,
            CompositeKind::Opened {
                absorbed_labels: vec![Label::new("bug", "ededed")]
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn drain_flushes_earliest_deadline_first() {
        let (windows, mut rx) = manager();
        for (subject, delivery) in [
            ("octo/widgets#2", "d-2"),
            ("octo/widgets#3", "d-3"),
            ("octo/widgets#1", "d-1"),
        ] {
            let mut evt = labeled("bug", delivery);
            evt.subject_key = SubjectKey::new(subject).unwrap();
            windows.submit(evt);
            tokio::time::advance(Duration::from_millis(100)).await;
        }

        assert_eq!(windows.drain(), 3);
        let mut order = Vec::new();
        while let Ok(Composition::Built(composite)) = rx.try_recv() {
            order.extend(composite.delivery_ids);
        }
        assert_eq!(
            order,
            ["d-2", "d-3", "d-1"]
                .map(|d| DeliveryId::new(d).unwrap())
                .to_vec()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submits_share_one_bucket() {
        let (windows, mut rx) = WindowManager::new(AggregationWindow::Fixed(Duration::from_secs(60)));
        let tasks: Vec<_> = (0..200)
            .map(|n| {
                let windows = windows.clone();
                tokio::spawn(async move { windows.submit(labeled("bug", &format!("d-{n}"))) })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), Outcome::Buffered);
        }
        assert_eq!(windows.open_buckets(), 1);

        assert_eq!(windows.drain(), 1);
        let Some(Composition::Built(composite)) = rx.recv().await else {
            panic!("expected one composite");
        };
        assert_eq!(composite.delivery_ids.len(), 200);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn submit_after_drain_never_buffers() {
        let (windows, _rx) = manager();
        assert_eq!(windows.drain(), 0);
        let Outcome::Flushed(composite) = windows.submit(labeled("bug", "d-1")) else {
            panic!("expected a single-event composite");
        };
        assert_eq!(composite.delivery_ids.len(), 1);
        assert_eq!(windows.open_buckets(), 0);
    }

    #[tokio::test]
    async fn non_combinable_events_render_now() {
        let (windows, _rx) = manager();
        let edited = event(EventType::Issues, Action::Edited, "octo/widgets#1", 1, "d-1");
        assert!(matches!(windows.submit(edited), Outcome::RenderNow(_)));
        assert_eq!(windows.open_buckets(), 0);
    }
}
