//! Concurrency Gate — component D. Two bounded semaphores per worker
//! process: `S_noproxy` (capacity 5) and `S_proxy` (capacity 20). Proxy
//! resolution precedes gate selection, so a task that could not obtain a
//! proxy is charged against the scarcer gate (spec.md §4.D).
//!
//! Grounded on the `Arc<Semaphore>`-scoped-permit idiom used throughout the
//! teacher's `src/layer4/src/executor.rs` background-task fan-out, here
//! narrowed to exactly the two gates spec.md calls for.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub const DEFAULT_NOPROXY_CAPACITY: usize = 5;
pub const DEFAULT_PROXY_CAPACITY: usize = 20;

pub struct ConcurrencyGate {
    no_proxy: Arc<Semaphore>,
    proxy: Arc<Semaphore>,
}

/// RAII guard: holding a variant keeps the matching semaphore's permit
/// acquired. Dropping it (including via panic unwind or task cancellation)
/// releases the permit — "Acquire the matching gate... Release gate on all
/// exit paths" (spec.md §4.E steps 4 and 7).
pub enum GatePermit {
    NoProxy(OwnedSemaphorePermit),
    Proxy(OwnedSemaphorePermit),
}

impl ConcurrencyGate {
    pub fn new(no_proxy_capacity: usize, proxy_capacity: usize) -> Self {
        Self {
            no_proxy: Arc::new(Semaphore::new(no_proxy_capacity)),
            proxy: Arc::new(Semaphore::new(proxy_capacity)),
        }
    }

    /// Acquires the gate matching whether a proxy was resolved for this
    /// task. FIFO-fair by construction (`tokio::sync::Semaphore` queues
    /// waiters in arrival order).
    pub async fn acquire(&self, has_proxy: bool) -> GatePermit {
        if has_proxy {
            let permit = self
                .proxy
                .clone()
                .acquire_owned()
                .await
                .expect("proxy gate semaphore never closes");
            GatePermit::Proxy(permit)
        } else {
            let permit = self
                .no_proxy
                .clone()
                .acquire_owned()
                .await
                .expect("no-proxy gate semaphore never closes");
            GatePermit::NoProxy(permit)
        }
    }

    /// Permits currently in use, summed across both gates — for invariant
    /// P2 ("outstanding permits across both semaphores equals
    /// `in_flight_count`").
    pub fn in_use(&self, no_proxy_capacity: usize, proxy_capacity: usize) -> usize {
        (no_proxy_capacity - self.no_proxy.available_permits())
            + (proxy_capacity - self.proxy.available_permits())
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(DEFAULT_NOPROXY_CAPACITY, DEFAULT_PROXY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_proxy_gate_caps_at_capacity() {
        let gate = ConcurrencyGate::new(2, 20);
        let p1 = gate.acquire(false).await;
        let p2 = gate.acquire(false).await;

        let gate_ref = &gate;
        let third = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            gate_ref.acquire(false),
        )
        .await;
        assert!(third.is_err(), "third no-proxy acquire should block at capacity 2");

        drop(p1);
        let third = gate.acquire(false).await;
        assert!(matches!(third, GatePermit::NoProxy(_)));
        drop(p2);
    }

    #[tokio::test]
    async fn proxy_and_no_proxy_gates_are_independent() {
        let gate = ConcurrencyGate::new(1, 1);
        let _p1 = gate.acquire(false).await;
        let p2 = tokio::time::timeout(std::time::Duration::from_millis(20), gate.acquire(true))
            .await
            .expect("proxy gate should not be blocked by no-proxy gate");
        assert!(matches!(p2, GatePermit::Proxy(_)));
    }
}
