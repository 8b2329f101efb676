//! Protocol timers on tokio.
//!
//! Each armed timer is a sleeping task that sends a [`TimerFire`] stamped
//! with the generation it was armed under. Aborting a task cannot retract a
//! fire that is already queued, so the runner passes every fire through
//! [`TimerManager::accept`], which drops fires from a generation that was
//! since replaced or cancelled.

use attestor_core::{Event, TimerId};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// A timer expiry as delivered on the timer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFire {
    pub id: TimerId,
    pub generation: u64,
}

struct Armed {
    generation: u64,
    task: JoinHandle<()>,
}

/// Arms, replaces and cancels the runner's timers.
pub struct TimerManager {
    armed: BTreeMap<TimerId, Armed>,
    next_generation: u64,
    fire_tx: mpsc::Sender<TimerFire>,
}

impl TimerManager {
    pub fn new(fire_tx: mpsc::Sender<TimerFire>) -> Self {
        Self {
            armed: BTreeMap::new(),
            next_generation: 0,
            fire_tx,
        }
    }

    /// Arm `id` to fire after `duration`, replacing any pending arming.
    pub fn set_timer(&mut self, id: TimerId, duration: Duration) {
        self.next_generation += 1;
        let fire = TimerFire {
            id,
            generation: self.next_generation,
        };
        let fire_tx = self.fire_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // A closed channel means the runner has stopped.
            let _ = fire_tx.send(fire).await;
        });

        let previous = self.armed.insert(
            id,
            Armed {
                generation: fire.generation,
                task,
            },
        );
        if let Some(previous) = previous {
            previous.task.abort();
            trace!(?id, replaced = previous.generation, "Timer re-armed");
        }
        debug!(?id, ?duration, generation = fire.generation, "Timer set");
    }

    pub fn cancel_timer(&mut self, id: TimerId) {
        if let Some(armed) = self.armed.remove(&id) {
            armed.task.abort();
            debug!(?id, "Timer cancelled");
        }
    }

    /// Turn a fire into its event if it belongs to the live arming of its
    /// timer.
    pub fn accept(&mut self, fire: TimerFire) -> Option<Event> {
        match self.armed.get(&fire.id) {
            Some(armed) if armed.generation == fire.generation => {
                self.armed.remove(&fire.id);
                Some(fire.id.into_event())
            }
            _ => {
                trace!(id = ?fire.id, generation = fire.generation, "Dropping stale timer fire");
                None
            }
        }
    }

    pub fn cancel_all(&mut self) {
        let count = self.armed.len();
        for armed in std::mem::take(&mut self.armed).into_values() {
            armed.task.abort();
        }
        trace!(count, "All timers cancelled");
    }

    pub fn active_count(&self) -> usize {
        self.armed.len()
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attestor_types::{Epoch, Round};

    fn manager() -> (TimerManager, mpsc::Receiver<TimerFire>) {
        let (fire_tx, fire_rx) = mpsc::channel(16);
        (TimerManager::new(fire_tx), fire_rx)
    }

    async fn next_fire(rx: &mut mpsc::Receiver<TimerFire>, within: Duration) -> Option<TimerFire> {
        tokio::time::timeout(within, rx.recv()).await.ok().flatten()
    }

    fn transmission(epoch: u32, round: u8) -> TimerId {
        TimerId::Transmission {
            epoch: Epoch(epoch),
            round: Round(round),
        }
    }

    #[tokio::test]
    async fn test_fire_is_accepted_once() {
        let (mut timers, mut rx) = manager();
        timers.set_timer(TimerId::Round, Duration::from_millis(5));

        let fire = next_fire(&mut rx, Duration::from_millis(200)).await.unwrap();
        assert!(matches!(timers.accept(fire), Some(Event::RoundTimer)));
        assert_eq!(timers.active_count(), 0);
        assert!(timers.accept(fire).is_none());
    }

    #[tokio::test]
    async fn test_queued_fire_of_replaced_timer_is_dropped() {
        let (mut timers, mut rx) = manager();
        timers.set_timer(TimerId::Progress, Duration::from_millis(5));
        // Let the first arming fire and sit in the channel unread.
        tokio::time::sleep(Duration::from_millis(50)).await;
        timers.set_timer(TimerId::Progress, Duration::from_millis(5));

        let stale = next_fire(&mut rx, Duration::from_millis(10)).await.unwrap();
        assert!(timers.accept(stale).is_none());

        let live = next_fire(&mut rx, Duration::from_millis(200)).await.unwrap();
        assert!(matches!(timers.accept(live), Some(Event::ProgressTimer)));
    }

    #[tokio::test]
    async fn test_queued_fire_of_cancelled_timer_is_dropped() {
        let (mut timers, mut rx) = manager();
        timers.set_timer(TimerId::Grace, Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(50)).await;
        timers.cancel_timer(TimerId::Grace);

        let fire = next_fire(&mut rx, Duration::from_millis(10)).await.unwrap();
        assert!(timers.accept(fire).is_none());
    }

    #[tokio::test]
    async fn test_cancel_prevents_fire() {
        let (mut timers, mut rx) = manager();
        timers.set_timer(TimerId::Resend, Duration::from_millis(50));
        timers.cancel_timer(TimerId::Resend);
        assert!(next_fire(&mut rx, Duration::from_millis(100)).await.is_none());
    }

    #[tokio::test]
    async fn test_transmission_timers_are_keyed_by_round() {
        let (mut timers, mut rx) = manager();
        for (epoch, round) in [(1, 4), (2, 1), (2, 2)] {
            timers.set_timer(transmission(epoch, round), Duration::from_millis(5));
        }
        timers.cancel_timer(transmission(2, 1));
        assert_eq!(timers.active_count(), 2);

        let mut fired = Vec::new();
        while let Some(fire) = next_fire(&mut rx, Duration::from_millis(100)).await {
            if let Some(Event::TransmissionTimer { epoch, round }) = timers.accept(fire) {
                fired.push((epoch.0, round.0));
            }
            if timers.active_count() == 0 {
                break;
            }
        }
        fired.sort_unstable();
        assert_eq!(fired, vec![(1, 4), (2, 2)]);
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let (mut timers, mut rx) = manager();
        timers.set_timer(TimerId::Round, Duration::from_millis(5));
        timers.set_timer(transmission(1, 1), Duration::from_millis(5));
        timers.cancel_all();
        assert_eq!(timers.active_count(), 0);
        assert!(next_fire(&mut rx, Duration::from_millis(50)).await.is_none());
    }
}
