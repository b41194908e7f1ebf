use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Номер запроса, выданный `RequestSequence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Монотонная последовательность запросов одной логической операции.
///
/// Каждый запрос получает билет при старте. Ответ применяется, только если
/// его билет новее последнего применённого изменения, поэтому устаревший
/// ответ, пришедший позже, отбрасывается.
#[derive(Debug, Clone, Default)]
pub struct RequestSequence {
    issued: Arc<AtomicU64>,
    applied: Arc<AtomicU64>,
}

impl RequestSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Ticket {
        Ticket(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Отмечает билет применённым. Возвращает `false`, если уже применено более новое изменение.
    pub fn try_apply(&self, ticket: Ticket) -> bool {
        let mut current = self.applied.load(Ordering::SeqCst);
        loop {
            if ticket.0 <= current {
                return false;
            }
            match self.applied.compare_exchange(
                current,
                ticket.0,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Уже применено изменение не старше этого билета.
    pub fn is_stale(&self, ticket: Ticket) -> bool {
        ticket.0 <= self.applied.load(Ordering::SeqCst)
    }
}

/// Защита от повторной отправки, пока предыдущая ещё выполняется.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    busy: Arc<AtomicBool>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None`, если операция уже выполняется.
    pub fn try_enter(&self) -> Option<InFlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| InFlightGuard { busy: self.busy.clone() })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}
