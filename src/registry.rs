use crate::handle::Unsubscribe;
use crate::listener::{Effect, Listener, Predicate, Trigger};
use crate::signal::{AbortReason, Signal};
use crate::store::Store;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Registration order key; ids only ever increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

struct Invocation {
    seq: u64,
    signal: Signal,
    started: bool,
}

#[derive(Default)]
struct Pending {
    next_seq: u64,
    invocations: Vec<Invocation>,
}

pub(crate) struct ListenerEntry<St: Store> {
    id: ListenerId,
    trigger: Trigger<St>,
    predicate: Predicate<St>,
    effect: Effect<St>,
    once: bool,
    pending: Mutex<Pending>,
    registry: Weak<Registry<St>>,
}

impl<St: Store> ListenerEntry<St> {
    pub(crate) fn id(&self) -> ListenerId {
        self.id
    }

    pub(crate) fn predicate(&self) -> &Predicate<St> {
        &self.predicate
    }

    pub(crate) fn effect(&self) -> &Effect<St> {
        &self.effect
    }

    pub(crate) fn is_once(&self) -> bool {
        self.once
    }

    /// Tracks a new invocation and returns its sequence number.
    pub(crate) fn add_pending(&self, signal: Signal) -> u64 {
        let mut pending = self.pending.lock();
        let seq = pending.next_seq;
        pending.next_seq += 1;
        pending.invocations.push(Invocation {
            seq,
            signal,
            started: false,
        });
        seq
    }

    pub(crate) fn mark_started(&self, seq: u64) {
        let mut pending = self.pending.lock();
        if let Some(invocation) = pending.invocations.iter_mut().find(|i| i.seq == seq) {
            invocation.started = true;
        }
    }

    pub(crate) fn remove_pending(&self, seq: u64) {
        self.pending.lock().invocations.retain(|i| i.seq != seq);
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.lock().invocations.len()
    }

    /// Aborts every pending invocation and forgets them.
    pub(crate) fn cancel_pending(&self, reason: AbortReason) {
        let drained = std::mem::take(&mut self.pending.lock().invocations);
        for invocation in drained {
            invocation.signal.abort(reason);
        }
    }

    /// Aborts the invocations that `seq` supersedes.
    ///
    /// Those are every other invocation that was launched before `seq` or has
    /// already started running. Invocations launched after `seq` that have
    /// not started yet are left alone: they are newer than the caller.
    pub(crate) fn cancel_others(&self, seq: u64) {
        let mut superseded = Vec::new();
        self.pending.lock().invocations.retain(|i| {
            let supersede = i.seq != seq && (i.seq < seq || i.started);
            if supersede {
                superseded.push(i.signal.clone());
            }
            !supersede
        });
        for signal in superseded {
            signal.abort(AbortReason::ListenerCancelled);
        }
    }

    pub(crate) fn subscribe(self: &Arc<Self>) {
        if let Some(registry) = self.registry.upgrade() {
            registry.insert(self.clone());
        }
    }

    pub(crate) fn unsubscribe(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.remove(self.id).is_some())
    }
}

/// Ordered map of live listener entries.
pub(crate) struct Registry<St: Store> {
    entries: Mutex<BTreeMap<ListenerId, Arc<ListenerEntry<St>>>>,
    next_id: AtomicU64,
}

impl<St: Store> Registry<St> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(0),
        })
    }

    /// Adds `listener` unless an entry with the same trigger and effect exists.
    pub(crate) fn start(self: &Arc<Self>, listener: Listener<St>) -> Unsubscribe<St> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries
            .values()
            .find(|entry| listener.same(&entry.trigger, &entry.effect))
        {
            tracing::debug!(id = ?existing.id, "listener already registered");
            return Unsubscribe::new(existing.clone());
        }

        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let Listener {
            trigger,
            effect,
            once,
        } = listener;
        let entry = Arc::new(ListenerEntry {
            id,
            predicate: trigger.to_predicate(),
            trigger,
            effect,
            once,
            pending: Mutex::default(),
            registry: Arc::downgrade(self),
        });
        entries.insert(id, entry.clone());
        tracing::debug!(?id, trigger = ?entry.trigger, "listener added");

        Unsubscribe::new(entry)
    }

    pub(crate) fn stop(&self, listener: &Listener<St>, cancel_active: bool) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            let id = entries
                .values()
                .find(|entry| listener.same(&entry.trigger, &entry.effect))
                .map(|entry| entry.id);
            id.and_then(|id| entries.remove(&id))
        };

        match removed {
            Some(entry) => {
                tracing::debug!(id = ?entry.id, cancel_active, "listener removed");
                if cancel_active {
                    entry.cancel_pending(AbortReason::ListenerCancelled);
                }
                true
            }
            None => false,
        }
    }

    /// Empties the registry, aborting every pending invocation with `reason`.
    pub(crate) fn clear(&self, reason: AbortReason) {
        let drained = std::mem::take(&mut *self.entries.lock());
        tracing::debug!(listeners = drained.len(), %reason, "listeners cleared");
        for entry in drained.values() {
            entry.cancel_pending(reason);
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<ListenerEntry<St>>> {
        self.entries.lock().values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn insert(&self, entry: Arc<ListenerEntry<St>>) {
        self.entries.lock().entry(entry.id).or_insert(entry);
    }

    fn remove(&self, id: ListenerId) -> Option<Arc<ListenerEntry<St>>> {
        let removed = self.entries.lock().remove(&id);
        if removed.is_some() {
            tracing::debug!(?id, "listener unsubscribed");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::from_fn;
    use crate::test_utils::CounterStore;

    fn listener(kind: &'static str) -> Listener<CounterStore> {
        Listener::new(Trigger::kind(kind), from_fn(|_, _| async { anyhow::Ok(()) }))
    }

    #[test]
    fn same_trigger_and_effect_register_once() {
        let registry = Registry::<CounterStore>::new();
        let listener = listener("add");

        let first = registry.start(listener.clone());
        let second = registry.start(listener.clone());
        assert_eq!(registry.len(), 1);

        assert!(second.unsubscribe());
        assert_eq!(registry.len(), 0);
        assert!(!first.unsubscribe());
    }

    #[test]
    fn distinct_effects_register_separately() {
        let registry = Registry::<CounterStore>::new();
        registry.start(listener("add"));
        registry.start(listener("add"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn snapshot_follows_registration_order() {
        let registry = Registry::<CounterStore>::new();
        let ids: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|kind| registry.start(listener(kind)).id())
            .collect();

        let snapshot: Vec<_> = registry.snapshot().iter().map(|e| e.id()).collect();
        assert_eq!(snapshot, ids);
    }

    #[test]
    fn stop_can_cancel_pending_invocations() {
        let registry = Registry::<CounterStore>::new();
        let listener = listener("add");
        registry.start(listener.clone());

        let entry = registry.snapshot().remove(0);
        let signal = Signal::new();
        entry.add_pending(signal.clone());

        assert!(registry.stop(&listener, true));
        assert!(!registry.stop(&listener, true));
        assert_eq!(signal.reason(), Some(AbortReason::ListenerCancelled));
        assert_eq!(entry.pending_len(), 0);
    }

    #[test]
    fn stop_without_cancel_leaves_invocations_running() {
        let registry = Registry::<CounterStore>::new();
        let listener = listener("add");
        registry.start(listener.clone());

        let entry = registry.snapshot().remove(0);
        let signal = Signal::new();
        entry.add_pending(signal.clone());

        assert!(registry.stop(&listener, false));
        assert!(!signal.is_aborted());
    }

    #[test]
    fn clear_cancels_everything_and_empties() {
        let registry = Registry::<CounterStore>::new();
        registry.start(listener("a"));
        registry.start(listener("b"));

        let signals: Vec<_> = registry
            .snapshot()
            .iter()
            .map(|entry| {
                let signal = Signal::new();
                entry.add_pending(signal.clone());
                signal
            })
            .collect();

        registry.clear(AbortReason::ListenerCancelled);

        assert_eq!(registry.len(), 0);
        for signal in signals {
            assert_eq!(signal.reason(), Some(AbortReason::ListenerCancelled));
        }
    }

    #[test]
    fn cancel_others_spares_caller_and_unstarted_newer_invocations() {
        let registry = Registry::<CounterStore>::new();
        registry.start(listener("add"));
        let entry = registry.snapshot().remove(0);

        let signals: Vec<_> = (0..4).map(|_| Signal::new()).collect();
        let seqs: Vec<_> = signals.iter().map(|s| entry.add_pending(s.clone())).collect();
        entry.mark_started(seqs[3]);

        entry.cancel_others(seqs[1]);

        assert_eq!(signals[0].reason(), Some(AbortReason::ListenerCancelled));
        assert!(!signals[1].is_aborted());
        assert!(!signals[2].is_aborted());
        assert_eq!(signals[3].reason(), Some(AbortReason::ListenerCancelled));
        assert_eq!(entry.pending_len(), 2);
    }

    #[test]
    fn subscribe_reinserts_removed_entry() {
        let registry = Registry::<CounterStore>::new();
        let handle = registry.start(listener("add"));
        let entry = registry.snapshot().remove(0);

        assert!(entry.unsubscribe());
        assert_eq!(registry.len(), 0);

        entry.subscribe();
        entry.subscribe();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot()[0].id(), handle.id());
    }
}
