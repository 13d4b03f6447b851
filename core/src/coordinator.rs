//! Coalesces concurrent token refreshes.
//!
//! # Design
//! The first request to see a 401 gets a `RefreshLease` and performs the
//! refresh. Every request that asks while the lease is held is parked on a
//! one-shot channel and learns the outcome when the lease is released.
//! Check-and-set of the `refreshing` flag happens under one short lock that
//! is never held across an `.await`.
//!
//! A lease dropped without `release` (the leader's future was cancelled)
//! settles as `Abandoned`: no waiter is left parked, and since nobody learned
//! whether the session survived, waiters compete for the lease again.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// How a refresh round-trip ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New tokens are in the credential store.
    Refreshed,
    /// The session is gone; credentials have been cleared.
    Failed,
    /// The leader went away before finishing. Nothing is known about the
    /// session, so the caller should try to acquire again.
    Abandoned,
}

#[derive(Debug, Default)]
struct RefreshState {
    refreshing: bool,
    waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

/// Result of `RefreshCoordinator::acquire_or_wait`.
#[derive(Debug)]
pub enum Acquired {
    /// The caller must refresh and then release the lease.
    Leader(RefreshLease),
    /// Another caller refreshed; this is how it went.
    Waited(RefreshOutcome),
}

/// Shared refresh state of one client. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct RefreshCoordinator {
    state: Arc<Mutex<RefreshState>>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Become the refresh leader, or wait for the current leader to finish.
    pub async fn acquire_or_wait(&self) -> Acquired {
        let receiver = {
            let mut state = self.state.lock();
            if !state.refreshing {
                state.refreshing = true;
                return Acquired::Leader(RefreshLease {
                    state: Arc::clone(&self.state),
                    settled: false,
                });
            }
            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(sender);
            receiver
        };
        // A closed channel means the lease vanished without settling.
        Acquired::Waited(receiver.await.unwrap_or(RefreshOutcome::Abandoned))
    }

    pub fn is_refreshing(&self) -> bool {
        self.state.lock().refreshing
    }

    /// Number of callers parked behind the current refresh.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

/// Proof that the holder is the only caller refreshing right now.
#[derive(Debug)]
pub struct RefreshLease {
    state: Arc<Mutex<RefreshState>>,
    settled: bool,
}

impl RefreshLease {
    /// Clear the `refreshing` flag and hand `outcome` to every waiter in
    /// arrival order.
    pub fn release(mut self, outcome: RefreshOutcome) {
        self.settle(outcome);
    }

    fn settle(&mut self, outcome: RefreshOutcome) {
        if self.settled {
            return;
        }
        self.settled = true;
        let waiters = {
            let mut state = self.state.lock();
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };
        tracing::debug!(waiters = waiters.len(), ?outcome, "releasing refresh waiters");
        for waiter in waiters {
            // The waiter may have been dropped; nothing to deliver then.
            let _ = waiter.send(outcome);
        }
    }
}

impl Drop for RefreshLease {
    fn drop(&mut self) {
        self.settle(RefreshOutcome::Abandoned);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn lead(coordinator: &RefreshCoordinator) -> RefreshLease {
        match coordinator.acquire_or_wait().await {
            Acquired::Leader(lease) => lease,
            Acquired::Waited(outcome) => panic!("expected lease, waited for {outcome:?}"),
        }
    }

    #[tokio::test]
    async fn first_caller_leads() {
        let coordinator = RefreshCoordinator::new();
        let lease = lead(&coordinator).await;
        assert!(coordinator.is_refreshing());
        lease.release(RefreshOutcome::Refreshed);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn waiters_receive_leader_outcome() {
        let coordinator = RefreshCoordinator::new();
        let lease = lead(&coordinator).await;

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.acquire_or_wait().await })
            })
            .collect();
        while coordinator.waiting() < 3 {
            tokio::task::yield_now().await;
        }

        lease.release(RefreshOutcome::Refreshed);
        for waiter in waiters {
            let acquired = waiter.await.unwrap();
            assert!(matches!(acquired, Acquired::Waited(RefreshOutcome::Refreshed)));
        }
        assert_eq!(coordinator.waiting(), 0);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn failure_reaches_every_waiter() {
        let coordinator = RefreshCoordinator::new();
        let lease = lead(&coordinator).await;

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.acquire_or_wait().await })
        };
        while coordinator.waiting() < 1 {
            tokio::task::yield_now().await;
        }
        lease.release(RefreshOutcome::Failed);
        assert!(matches!(
            waiter.await.unwrap(),
            Acquired::Waited(RefreshOutcome::Failed)
        ));
    }

    #[tokio::test]
    async fn waiters_wake_in_arrival_order() {
        let coordinator = RefreshCoordinator::new();
        let lease = lead(&coordinator).await;
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut waiters = Vec::new();
        for index in 0..3 {
            let waiter = {
                let coordinator = coordinator.clone();
                let order = Arc::clone(&order);
                tokio::spawn(async move {
                    coordinator.acquire_or_wait().await;
                    order.lock().push(index);
                })
            };
            waiters.push(waiter);
            // park each waiter before spawning the next
            while coordinator.waiting() < index + 1 {
                tokio::task::yield_now().await;
            }
        }

        lease.release(RefreshOutcome::Refreshed);
        for waiter in waiters {
            waiter.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn dropped_lease_abandons_waiters() {
        let coordinator = RefreshCoordinator::new();
        let lease = lead(&coordinator).await;

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.acquire_or_wait().await })
        };
        while coordinator.waiting() < 1 {
            tokio::task::yield_now().await;
        }
        drop(lease);
        assert!(matches!(
            waiter.await.unwrap(),
            Acquired::Waited(RefreshOutcome::Abandoned)
        ));
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn next_wave_gets_a_new_leader() {
        let coordinator = RefreshCoordinator::new();
        lead(&coordinator).await.release(RefreshOutcome::Refreshed);
        let lease = lead(&coordinator).await;
        lease.release(RefreshOutcome::Failed);
        assert!(!coordinator.is_refreshing());
    }
}
