//! Watch keys and the per-filesystem watch service.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use log::warn;
use parking_lot::Condvar;
use parking_lot::Mutex;
#[cfg(feature = "serializable")]
use serde::Deserialize;
#[cfg(feature = "serializable")]
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::path::EntryPath;

/// Cap on events buffered per key before overflow reporting starts.
pub const MAX_QUEUE_SIZE: usize = 256;

/// The kind of a watch event.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum EventKind {
    /// An entry was created in the watched directory.
    Create,
    /// An entry was deleted from the watched directory.
    Delete,
    /// An entry in the watched directory was modified.
    Modify,
    /// Events were dropped; `count` carries how many.
    Overflow,
}

/// One queued watch event.
#[derive(Clone, Debug, PartialEq)]
pub struct WatchEvent {
    /// What happened.
    pub kind: EventKind,
    /// How many occurrences this event stands for. Always 1 except for
    /// overflow markers.
    pub count: usize,
    /// The entry the event concerns, relative to the watched directory.
    /// Overflow markers have no context.
    pub context: Option<EntryPath>,
}

impl WatchEvent {
    /// A single event of `kind` for `context`.
    pub fn new(kind: EventKind, context: Option<EntryPath>) -> WatchEvent {
        WatchEvent {
            kind,
            count: 1,
            context,
        }
    }
}

#[derive(Debug)]
struct KeyState {
    events: VecDeque<WatchEvent>,
    signalled: bool,
    valid: bool,
}

/// A registration of one watchable directory with a [`WatchService`].
///
/// State machine: a key is READY until [`signal`](WatchKey::signal)
/// enqueues it onto its service (SIGNALLED); signalling again while
/// SIGNALLED does not re-enqueue, which is what coalesces bursts of events
/// into one queue appearance. [`reset`](WatchKey::reset) returns the key to
/// READY once its events have been drained.
#[derive(Debug)]
pub struct WatchKey {
    service: Weak<WatchService>,
    registration_id: u64,
    file_id: u64,
    watchable: EntryPath,
    kinds: Box<[EventKind]>,
    state: Mutex<KeyState>,
}

impl WatchKey {
    /// The path this key was registered for.
    pub fn watchable(&self) -> &EntryPath {
        &self.watchable
    }

    /// The kinds this key subscribed to.
    pub fn kinds(&self) -> &[EventKind] {
        &self.kinds
    }

    /// Whether events of `kind` should be delivered to this key. Overflow
    /// is always delivered.
    pub fn subscribes(&self, kind: EventKind) -> bool {
        kind == EventKind::Overflow || self.kinds.contains(&kind)
    }

    /// False once cancelled or the service has closed.
    pub fn is_valid(&self) -> bool {
        self.state.lock().valid
    }

    /// Appends an event to the key's buffer. Once the buffer holds
    /// [`MAX_QUEUE_SIZE`] events, further posts collapse into a trailing
    /// overflow marker whose count grows with each drop.
    pub fn post(&self, event: WatchEvent) {
        let mut state = self.state.lock();
        if state.events.len() >= MAX_QUEUE_SIZE {
            match state.events.back_mut() {
                Some(last) if last.kind == EventKind::Overflow => {
                    last.count += 1;
                }
                _ => {
                    if state.events.len() == MAX_QUEUE_SIZE {
                        warn!("watch key event buffer overflow");
                    }
                    state.events.push_back(WatchEvent {
                        kind: EventKind::Overflow,
                        count: 1,
                        context: None,
                    });
                }
            }
            return;
        }
        state.events.push_back(event);
    }

    /// Marks the key signalled, enqueueing it onto the service on the
    /// READY to SIGNALLED transition only.
    pub fn signal(self: &Arc<Self>) {
        let transition = {
            let mut state = self.state.lock();
            let transition = !state.signalled;
            state.signalled = true;
            transition
        };
        if transition {
            if let Some(service) = self.service.upgrade() {
                service.enqueue(self.clone());
            }
        }
    }

    /// Drains and returns the pending events in post order, resetting
    /// overflow accounting.
    pub fn poll_events(&self) -> Vec<WatchEvent> {
        self.state.lock().events.drain(..).collect()
    }

    /// Makes a signalled key eligible for delivery again: with an empty
    /// event buffer it returns to READY; with events still pending it stays
    /// SIGNALLED and re-enters the service queue. Returns whether the key
    /// is still valid.
    pub fn reset(self: &Arc<Self>) -> bool {
        let requeue = {
            let mut state = self.state.lock();
            if !state.valid || !state.signalled {
                return state.valid;
            }
            if state.events.is_empty() {
                state.signalled = false;
                false
            } else {
                true
            }
        };
        if requeue {
            if let Some(service) = self.service.upgrade() {
                service.enqueue(self.clone());
            }
        }
        true
    }

    /// Invalidates the key and removes its registration from the service.
    pub fn cancel(self: &Arc<Self>) {
        self.invalidate();
        if let Some(service) = self.service.upgrade() {
            service.deregister(self);
        }
    }

    fn invalidate(&self) {
        self.state.lock().valid = false;
    }

    /// True when the key is in SIGNALLED state. Test hook.
    pub fn is_signalled(&self) -> bool {
        self.state.lock().signalled
    }

    /// The watched file id this key was registered under.
    pub(crate) fn registration_file_id(&self) -> u64 {
        self.file_id
    }
}

#[derive(Debug)]
struct ServiceState {
    open: bool,
    queue: VecDeque<Arc<WatchKey>>,
    registrations: Vec<Arc<WatchKey>>,
    next_registration_id: u64,
}

/// A watch service: holds the registered keys and the blocking queue of
/// signalled keys.
///
/// The key queue is unbounded and guarded by a mutex/condvar pair;
/// [`take`](WatchService::take) blocks the caller, no thread is spawned.
#[derive(Debug)]
pub struct WatchService {
    state: Mutex<ServiceState>,
    ready: Condvar,
}

impl WatchService {
    /// Creates an open service with no registrations.
    pub fn new() -> Arc<WatchService> {
        Arc::new(WatchService {
            state: Mutex::new(ServiceState {
                open: true,
                queue: VecDeque::new(),
                registrations: Vec::new(),
                next_registration_id: 0,
            }),
            ready: Condvar::new(),
        })
    }

    /// Registers a watchable directory (identified by its file id) for
    /// `kinds` and returns the new key.
    pub fn register(
        self: &Arc<Self>,
        file_id: u64,
        watchable: EntryPath,
        kinds: &[EventKind],
    ) -> Result<Arc<WatchKey>> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(Error::ClosedWatchService);
        }
        // Registration ids disambiguate keys for deregistration; several
        // keys may watch the same file.
        let registration_id = state.next_registration_id;
        state.next_registration_id += 1;
        let key = Arc::new(WatchKey {
            service: Arc::downgrade(self),
            registration_id,
            file_id,
            watchable,
            kinds: kinds.to_vec().into_boxed_slice(),
            state: Mutex::new(KeyState {
                events: VecDeque::new(),
                signalled: false,
                valid: true,
            }),
        });
        state.registrations.push(key.clone());
        Ok(key)
    }

    /// The registered keys watching the file with `file_id`.
    pub(crate) fn keys_for(&self, file_id: u64) -> Vec<Arc<WatchKey>> {
        self.state
            .lock()
            .registrations
            .iter()
            .filter(|key| key.registration_file_id() == file_id)
            .cloned()
            .collect()
    }

    fn enqueue(&self, key: Arc<WatchKey>) {
        let mut state = self.state.lock();
        if !state.open {
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.ready.notify_one();
    }

    fn deregister(&self, key: &Arc<WatchKey>) {
        self.state
            .lock()
            .registrations
            .retain(|k| k.registration_id != key.registration_id);
    }

    /// Removes and returns the next signalled key, without blocking.
    pub fn poll(&self) -> Result<Option<Arc<WatchKey>>> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(Error::ClosedWatchService);
        }
        Ok(state.queue.pop_front())
    }

    /// Removes and returns the next signalled key, waiting up to `timeout`
    /// for one to arrive.
    pub fn poll_timeout(&self, timeout: Duration) -> Result<Option<Arc<WatchKey>>> {
        let deadline = std::time::Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if !state.open {
                return Err(Error::ClosedWatchService);
            }
            if let Some(key) = state.queue.pop_front() {
                return Ok(Some(key));
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                return Ok(state.queue.pop_front());
            }
        }
    }

    /// Removes and returns the next signalled key, blocking until one
    /// arrives or the service closes.
    pub fn take(&self) -> Result<Arc<WatchKey>> {
        let mut state = self.state.lock();
        loop {
            if !state.open {
                return Err(Error::ClosedWatchService);
            }
            if let Some(key) = state.queue.pop_front() {
                return Ok(key);
            }
            self.ready.wait(&mut state);
        }
    }

    /// Whether the service is still open.
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Closes the service: every key is invalidated, the queue is drained,
    /// blocked `take` calls fail with `ClosedWatchService`, and so does any
    /// later `register`/`poll`/`take`. Closing twice is harmless.
    pub fn close(&self) {
        let keys = {
            let mut state = self.state.lock();
            if !state.open {
                return;
            }
            state.open = false;
            state.queue.clear();
            std::mem::take(&mut state.registrations)
        };
        for key in keys {
            key.invalidate();
        }
        self.ready.notify_all();
    }

    /// Snapshot of the queued keys, front first. Test hook.
    pub fn queued_keys(&self) -> Vec<Arc<WatchKey>> {
        self.state.lock().queue.iter().cloned().collect()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use crate::error::Error;
    use crate::path::EntryPath;
    use crate::watch::EventKind;
    use crate::watch::MAX_QUEUE_SIZE;
    use crate::watch::WatchEvent;
    use crate::watch::WatchService;

    fn create_event() -> WatchEvent {
        WatchEvent::new(EventKind::Create, Some(EntryPath::empty()))
    }

    #[test]
    fn signal_coalesces_and_reset_rearms() {
        let service = WatchService::new();
        let key = service
            .register(1, EntryPath::empty(), &[EventKind::Create])
            .unwrap();

        key.post(create_event());
        key.signal();
        let queued = service.queued_keys();
        assert_eq!(1, queued.len());
        assert!(Arc::ptr_eq(&queued[0], &key));

        let polled = service.poll().unwrap().unwrap();
        assert!(Arc::ptr_eq(&polled, &key));
        assert_eq!(vec![create_event()], polled.poll_events());

        // Still signalled: another post + signal does not requeue.
        key.post(create_event());
        key.signal();
        assert!(service.poll().unwrap().is_none());

        // Drain, then reset back to READY.
        assert_eq!(1, key.poll_events().len());
        assert!(key.reset());
        assert!(!key.is_signalled());

        // A new event is deliverable again.
        key.post(create_event());
        key.signal();
        let polled = service.poll().unwrap().unwrap();
        assert!(Arc::ptr_eq(&polled, &key));
    }

    #[test]
    fn reset_requeues_when_events_pending() {
        let service = WatchService::new();
        let key = service
            .register(1, EntryPath::empty(), &[EventKind::Create])
            .unwrap();
        key.post(create_event());
        key.signal();
        service.poll().unwrap().unwrap();

        key.post(create_event());
        assert!(key.reset());
        // Events were pending, so the key stayed signalled and requeued.
        assert!(key.is_signalled());
        let polled = service.poll().unwrap().unwrap();
        assert!(Arc::ptr_eq(&polled, &key));
    }

    #[test]
    fn coalescing_keeps_all_events_in_post_order() {
        let service = WatchService::new();
        let key = service
            .register(1, EntryPath::empty(), &[EventKind::Create, EventKind::Delete])
            .unwrap();
        for kind in [EventKind::Create, EventKind::Delete, EventKind::Create] {
            key.post(WatchEvent::new(kind, None));
            key.signal();
        }
        assert_eq!(1, service.queued_keys().len());
        let events = key.poll_events();
        assert_eq!(
            vec![EventKind::Create, EventKind::Delete, EventKind::Create],
            events.iter().map(|e| e.kind).collect::<Vec<_>>()
        );
    }

    #[test]
    fn overflow_marker_counts_drops() {
        let service = WatchService::new();
        let key = service
            .register(1, EntryPath::empty(), &[EventKind::Create])
            .unwrap();
        let k = 5;
        for _ in 0..MAX_QUEUE_SIZE + k {
            key.post(create_event());
        }
        key.signal();
        let events = key.poll_events();
        assert_eq!(MAX_QUEUE_SIZE + 1, events.len());
        let last = events.last().unwrap();
        assert_eq!(EventKind::Overflow, last.kind);
        assert_eq!(k, last.count);
        assert_eq!(None, last.context);

        // Draining resets overflow accounting.
        key.post(create_event());
        let events = key.poll_events();
        assert_eq!(1, events.len());
        assert_eq!(EventKind::Create, events[0].kind);
    }

    #[test]
    fn cancelled_key_fails_reset() {
        let service = WatchService::new();
        let key = service
            .register(1, EntryPath::empty(), &[EventKind::Create])
            .unwrap();
        key.cancel();
        assert!(!key.is_valid());
        assert!(!key.reset());
    }

    #[test]
    fn close_invalidates_and_rejects() {
        let service = WatchService::new();
        let key = service
            .register(1, EntryPath::empty(), &[EventKind::Create])
            .unwrap();
        key.post(create_event());
        key.signal();

        service.close();
        assert!(!key.is_valid());
        assert!(matches!(service.poll(), Err(Error::ClosedWatchService)));
        assert!(matches!(service.take(), Err(Error::ClosedWatchService)));
        assert!(matches!(
            service.register(2, EntryPath::empty(), &[EventKind::Create]),
            Err(Error::ClosedWatchService)
        ));
        // Closing again is a no-op.
        service.close();
    }

    #[test]
    fn take_blocks_until_signal() {
        let service = WatchService::new();
        let key = service
            .register(1, EntryPath::empty(), &[EventKind::Create])
            .unwrap();

        let (tx, rx) = mpsc::channel();
        let taker = {
            let service = service.clone();
            thread::spawn(move || {
                tx.send(()).unwrap();
                service.take()
            })
        };
        rx.recv().unwrap();
        // Give the taker a moment to block.
        thread::sleep(Duration::from_millis(50));
        key.post(create_event());
        key.signal();
        let taken = taker.join().unwrap().unwrap();
        assert!(Arc::ptr_eq(&taken, &key));
    }

    #[test]
    fn close_unblocks_take() {
        let service = WatchService::new();
        let taker = {
            let service = service.clone();
            thread::spawn(move || service.take())
        };
        thread::sleep(Duration::from_millis(50));
        service.close();
        assert!(matches!(
            taker.join().unwrap(),
            Err(Error::ClosedWatchService)
        ));
    }

    #[test]
    fn poll_timeout_returns_when_signalled() {
        let service = WatchService::new();
        let key = service
            .register(1, EntryPath::empty(), &[EventKind::Create])
            .unwrap();
        assert!(
            service
                .poll_timeout(Duration::from_millis(10))
                .unwrap()
                .is_none()
        );
        key.post(create_event());
        key.signal();
        let polled = service
            .poll_timeout(Duration::from_millis(100))
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&polled, &key));
    }
}
