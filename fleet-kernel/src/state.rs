use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type Shared<T> = Arc<JobSlot<T>>;

pub fn new_slot<T>() -> Shared<T> {
    Arc::new(JobSlot::default())
}

/// Créneau d'un job de maintenance : une seule exécution à la fois,
/// le dernier rapport reste consultable.
pub struct JobSlot<T> {
    running: AtomicBool,
    last: Mutex<Option<T>>,
}

impl<T> Default for JobSlot<T> {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(false),
            last: Mutex::new(None),
        }
    }
}

impl<T: Clone> JobSlot<T> {
    /// Réserve le créneau, `None` si une exécution est déjà en cours.
    pub fn try_begin(&self) -> Option<JobTicket<'_, T>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| JobTicket { slot: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn last(&self) -> Option<T> {
        self.last.lock().clone()
    }
}

/// Libère le créneau au drop, même si le job a échoué.
pub struct JobTicket<'a, T> {
    slot: &'a JobSlot<T>,
}

impl<T> JobTicket<'_, T> {
    pub fn finish(self, report: T) {
        *self.slot.last.lock() = Some(report);
    }
}

impl<T> Drop for JobTicket<'_, T> {
    fn drop(&mut self) {
        self.slot.running.store(false, Ordering::Release);
    }
}
