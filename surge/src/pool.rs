//! Virtual user pool
//!
//! Each virtual user is a tokio task looping over `iteration -> sleep`. The pool is resized with
//! [`VirtualUserPool::reconcile`]; shrinking is cooperative, so a virtual user told to stop
//! always finishes the iteration it is in.
use crate::aggregator::Metrics;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout_at, Instant};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn, Instrument};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum VirtualUserState {
    Running = 0,
    /// Signalled to stop; exits once its current iteration completes.
    Stopping = 1,
    Stopped = 2,
}

impl VirtualUserState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

struct Control {
    state: AtomicU8,
    in_flight: AtomicBool,
    wake: Notify,
}

impl Control {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(VirtualUserState::Running as u8),
            in_flight: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    fn state(&self) -> VirtualUserState {
        VirtualUserState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: VirtualUserState, to: VirtualUserState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn stop(&self) -> bool {
        let stopped = self.transition(VirtualUserState::Running, VirtualUserState::Stopping);
        if stopped {
            self.wake.notify_one();
        }
        stopped
    }

    /// Takes back a stop signal the virtual user has not acted on yet.
    fn revive(&self) -> bool {
        self.transition(VirtualUserState::Stopping, VirtualUserState::Running)
    }

    fn try_exit(&self) -> bool {
        self.transition(VirtualUserState::Stopping, VirtualUserState::Stopped)
    }
}

struct VirtualUser {
    id: u64,
    control: Arc<Control>,
    handle: JoinHandle<()>,
}

impl VirtualUser {
    /// A `Stopped` user has left its loop even if its task is still being torn down.
    fn is_alive(&self) -> bool {
        !self.handle.is_finished() && self.control.state() != VirtualUserState::Stopped
    }
}

pub struct VirtualUserPool<T> {
    iteration: T,
    sleep: Duration,
    metrics: Metrics,
    users: Vec<VirtualUser>,
    next_id: u64,
    peak: usize,
}

impl<T, F> VirtualUserPool<T>
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    pub fn new(iteration: T, sleep: Duration, metrics: Metrics) -> Self {
        Self {
            iteration,
            sleep,
            metrics,
            users: vec![],
            next_id: 0,
            peak: 0,
        }
    }

    /// Moves the number of running virtual users towards `target`.
    ///
    /// Growing first revives virtual users that were told to stop but are still alive, then
    /// spawns new ones. Shrinking signals the most recently started ones.
    pub fn reconcile(&mut self, target: usize) {
        self.reap();

        let mut running = self.running();
        if running < target {
            for user in &self.users {
                if running == target {
                    break;
                }
                if user.control.revive() {
                    trace!("Revived virtual user {}", user.id);
                    running += 1;
                }
            }

            let spawned = target - running;
            for _ in 0..spawned {
                self.spawn();
            }
            if spawned > 0 {
                debug!("Spawned {spawned} virtual users (target {target})");
            }
        } else if running > target {
            let mut signalled = 0;
            for user in self.users.iter().rev() {
                if running - signalled == target {
                    break;
                }
                if user.control.stop() {
                    signalled += 1;
                }
            }
            debug!("Signalled {signalled} virtual users to stop (target {target})");
        }

        self.peak = self.peak.max(self.users.len());
        self.metrics.set_active_vus(self.users.len());
    }

    /// Virtual users that have not exited yet, including those stopping.
    pub fn len(&self) -> usize {
        self.users.iter().filter(|u| u.is_alive()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn running(&self) -> usize {
        self.users
            .iter()
            .filter(|u| u.control.state() == VirtualUserState::Running)
            .count()
    }

    /// Largest number of live virtual users observed after any reconcile.
    pub fn peak(&self) -> usize {
        self.peak
    }

    fn stop_all(&mut self) {
        for user in &self.users {
            user.control.stop();
        }
    }

    /// Stops every virtual user and waits up to `grace` for them to finish their iteration.
    ///
    /// Virtual users still running afterwards are aborted. Each one aborted mid-request is
    /// counted as interrupted. Returns the number of interrupted requests.
    pub async fn shutdown(&mut self, grace: Duration) -> u64 {
        self.stop_all();

        let deadline = deadline_after(grace);
        let mut interrupted = 0;
        for mut user in self.users.drain(..) {
            if timeout_at(deadline, &mut user.handle).await.is_ok() {
                continue;
            }

            user.handle.abort();
            let _ = (&mut user.handle).await;
            if user.control.in_flight.load(Ordering::Acquire) {
                warn!("Virtual user {} aborted mid-request", user.id);
                self.metrics.record_interrupted();
                interrupted += 1;
            } else {
                debug!("Virtual user {} aborted while idle", user.id);
            }
        }

        self.metrics.set_active_vus(0);
        interrupted
    }

    fn spawn(&mut self) {
        let id = self.next_id;
        self.next_id += 1;

        let control = Arc::new(Control::new());
        let handle = tokio::spawn(
            virtual_user(id, self.iteration.clone(), self.sleep, control.clone())
                .instrument(tracing::trace_span!("vu", id)),
        );

        self.users.push(VirtualUser {
            id,
            control,
            handle,
        });
    }

    fn reap(&mut self) {
        self.users.retain(VirtualUser::is_alive);
    }
}

async fn virtual_user<T, F>(id: u64, iteration: T, sleep: Duration, control: Arc<Control>)
where
    T: Fn() -> F,
    F: Future<Output = ()>,
{
    trace!("Virtual user {id} started");
    // NOTE: The first iteration always runs, even if a stop arrived before the task was polled.
    'outer: loop {
        control.in_flight.store(true, Ordering::Release);
        iteration().await;
        control.in_flight.store(false, Ordering::Release);

        if control.try_exit() {
            break;
        }

        let deadline = deadline_after(sleep);
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => break,
                _ = control.wake.notified() => {
                    // NOTE: A stale wake-up after a revive just resumes the sleep.
                    if control.try_exit() {
                        break 'outer;
                    }
                }
            }
        }

        if control.try_exit() {
            break;
        }
    }
    trace!("Virtual user {id} stopped");
}

/// `now + after`, saturating about 30 years out.
fn deadline_after(after: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(after)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}
