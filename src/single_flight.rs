//! Cancelable one-shot timers with "latest generation wins" semantics.
//!
//! Arming bumps a generation counter and spawns a local task that sleeps and
//! then fires only if its captured generation is still current. Arming again or
//! calling [`SingleFlight::cancel`] therefore invalidates every earlier shot.
//! Must be armed from inside a `tokio::task::LocalSet`.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

#[derive(Default)]
struct Slot {
    generation: Cell<u64>,
    pending: Cell<bool>,
}

/// One timer purpose; at most one shot is live at a time.
#[derive(Clone, Default)]
pub struct SingleFlight {
    slot: Rc<Slot>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any pending shot with one that runs `callback` after `delay`.
    pub fn arm<F>(&self, delay: Duration, callback: F) -> u64
    where
        F: FnOnce() + 'static,
    {
        let generation = self.bump();
        self.slot.pending.set(true);
        let slot = Rc::clone(&self.slot);
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if slot.generation.get() != generation {
                return;
            }
            slot.pending.set(false);
            callback();
        });
        generation
    }

    pub fn cancel(&self) {
        self.bump();
        self.slot.pending.set(false);
    }

    pub fn is_pending(&self) -> bool {
        self.slot.pending.get()
    }

    fn bump(&self) -> u64 {
        let next = self.slot.generation.get().wrapping_add(1);
        self.slot.generation.set(next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::SingleFlight;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;
    use tokio::task::LocalSet;
    use tokio::time::sleep;

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_rearming_replaces_previous_shot() {
        LocalSet::new()
            .run_until(async {
                let timer = SingleFlight::new();
                let fired = Rc::new(Cell::new(Vec::<u32>::new()));
                for tag in 0..3u32 {
                    let fired = Rc::clone(&fired);
                    timer.arm(Duration::from_millis(100), move || {
                        let mut seen = fired.take();
                        seen.push(tag);
                        fired.set(seen);
                    });
                    sleep(Duration::from_millis(40)).await;
                }
                assert!(timer.is_pending());
                sleep(Duration::from_millis(200)).await;
                assert_eq!(fired.take(), vec![2]);
                assert!(!timer.is_pending());
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_cancel_prevents_fire() {
        LocalSet::new()
            .run_until(async {
                let timer = SingleFlight::new();
                let fired = Rc::new(Cell::new(0u32));
                let fired_clone = Rc::clone(&fired);
                timer.arm(Duration::from_millis(50), move || {
                    fired_clone.set(fired_clone.get() + 1)
                });
                timer.cancel();
                assert!(!timer.is_pending());
                sleep(Duration::from_millis(100)).await;
                assert_eq!(fired.get(), 0);
            })
            .await;
    }
}
