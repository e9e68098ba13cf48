//! Round-synchronized scheduling for multiple bugs.
//!
//! Every bug runs on its own thread. After each visible action it parks at the
//! barrier in [`Control`] and waits for a work permit. The control thread
//! grants permits one round at a time: it waits until every live bug is parked
//! and permission to run is asserted, then releases all of them together.
//!
//! ```text
//! control thread:  pause -> wait(all parked && (running || step)) -> grant -> ...
//! bug thread:      action -> complete_current_task -> get_work_permit -> ...
//! ```
//!
//! A round is therefore complete for every bug before any bug starts the next
//! one. Within a round there is no ordering between bugs.

use crate::error::RuntimeError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default pause between rounds, in milliseconds.
pub const DEFAULT_PAUSE_MS: u64 = 250;

/// Run configuration for an interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Pause between rounds. Animation pacing only.
    pub pause_ms: u64,
    /// Assert run permission as soon as the interpreter starts.
    pub start_running: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            pause_ms: DEFAULT_PAUSE_MS,
            start_running: false,
        }
    }
}

impl RunConfig {
    /// Parse a JSON configuration document. Missing fields take their defaults.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bugs_lang::scheduler::RunConfig;
    ///
    /// let config = RunConfig::from_json(r#"{"pause_ms": 10}"#).unwrap();
    /// assert_eq!(config.pause_ms, 10);
    /// assert!(!config.start_running);
    /// ```
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The inter-round pause as a [`Duration`].
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

/// Lock a mutex, ignoring poisoning.
///
/// A bug thread that panics must not take the renderer's read API down with it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct ControlState {
    /// Live bugs by id; the value is the bug's blocked flag.
    live: BTreeMap<usize, bool>,
    running: bool,
    step_pending: bool,
    killed: bool,
    pause: Duration,
    rounds: u64,
    /// When false nobody grants permits, so handshakes return at once.
    supervised: bool,
}

impl ControlState {
    fn all_blocked(&self) -> bool {
        self.live.values().all(|&blocked| blocked)
    }

    fn may_grant(&self) -> bool {
        self.all_blocked() && (self.running || self.step_pending)
    }
}

/// Shared run-control state and round barrier.
#[derive(Debug)]
pub struct Control {
    state: Mutex<ControlState>,
    cvar: Condvar,
    /// Mirror of `ControlState::killed`, polled at every statement.
    halted: AtomicBool,
}

impl Control {
    /// Create a barrier driven by a control thread.
    pub fn new(config: &RunConfig) -> Self {
        Self::with_supervision(config, true)
    }

    /// Create a barrier that nobody drives.
    ///
    /// Handshakes return immediately (unless killed), so a single bug can be
    /// evaluated on the calling thread.
    pub fn unsupervised() -> Self {
        Self::with_supervision(&RunConfig::default(), false)
    }

    fn with_supervision(config: &RunConfig, supervised: bool) -> Self {
        Self {
            state: Mutex::new(ControlState {
                live: BTreeMap::new(),
                running: config.start_running,
                step_pending: false,
                killed: false,
                pause: config.pause(),
                rounds: 0,
                supervised,
            }),
            cvar: Condvar::new(),
            halted: AtomicBool::new(false),
        }
    }

    // =========================================================================
    // Bug side
    // =========================================================================

    /// Add a bug to the live set. Bugs start blocked.
    pub fn register(&self, id: usize) {
        lock(&self.state).live.insert(id, true);
        self.cvar.notify_all();
    }

    /// Mark the bug as parked after finishing its action for this round.
    pub fn complete_current_task(&self, id: usize) {
        let mut state = lock(&self.state);
        if let Some(blocked) = state.live.get_mut(&id) {
            *blocked = true;
        }
        drop(state);
        self.cvar.notify_all();
    }

    /// Wait until the control thread releases this bug.
    ///
    /// Returns [`RuntimeError::Halted`] if the interpreter is killed while waiting.
    pub fn get_work_permit(&self, id: usize) -> Result<(), RuntimeError> {
        let state = lock(&self.state);
        if !state.supervised {
            return if state.killed {
                Err(RuntimeError::Halted)
            } else {
                Ok(())
            };
        }
        let state = self
            .cvar
            .wait_while(state, |s| !s.killed && s.live.get(&id) == Some(&true))
            .unwrap_or_else(PoisonError::into_inner);
        if state.killed {
            Err(RuntimeError::Halted)
        } else {
            Ok(())
        }
    }

    /// Park after an action and wait for the next permit.
    pub fn handshake(&self, id: usize) -> Result<(), RuntimeError> {
        self.complete_current_task(id);
        self.get_work_permit(id)
    }

    /// Remove a finished (or failed) bug from the live set.
    pub fn terminate(&self, id: usize) {
        lock(&self.state).live.remove(&id);
        self.cvar.notify_all();
    }

    /// Returns `true` once kill has been asserted.
    pub fn is_killed(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    // =========================================================================
    // Controller side
    // =========================================================================

    /// Assert continuous permission to run.
    pub fn run(&self) {
        let mut state = lock(&self.state);
        state.running = true;
        debug!("run permission asserted");
        drop(state);
        self.cvar.notify_all();
    }

    /// Revoke permission to run, including any pending single step.
    pub fn pause(&self) {
        let mut state = lock(&self.state);
        state.running = false;
        state.step_pending = false;
        debug!("run permission revoked");
        drop(state);
        self.cvar.notify_all();
    }

    /// Grant exactly one round, then revert to paused.
    pub fn step(&self) {
        let mut state = lock(&self.state);
        state.running = false;
        state.step_pending = true;
        debug!("single step requested");
        drop(state);
        self.cvar.notify_all();
    }

    /// Raise the cooperative termination flag and wake everybody.
    pub fn kill(&self) {
        lock(&self.state).killed = true;
        self.halted.store(true, Ordering::Release);
        self.cvar.notify_all();
    }

    /// Change the pause between rounds.
    pub fn set_pause(&self, pause: Duration) {
        lock(&self.state).pause = pause;
        self.cvar.notify_all();
    }

    /// Returns `true` while continuous permission is asserted.
    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    /// Number of rounds granted so far.
    pub fn rounds(&self) -> u64 {
        lock(&self.state).rounds
    }

    /// Number of bugs still live.
    pub fn live_count(&self) -> usize {
        lock(&self.state).live.len()
    }

    /// Run the control loop until every bug has finished or kill is asserted.
    ///
    /// Called on the control thread.
    pub fn run_rounds(&self) {
        loop {
            let state = self.sleep_between_rounds();

            let mut state = self
                .cvar
                .wait_while(state, |s| {
                    !s.killed && !s.live.is_empty() && !s.may_grant()
                })
                .unwrap_or_else(PoisonError::into_inner);

            if state.killed || state.live.is_empty() {
                debug!("control loop exiting after {} round(s)", state.rounds);
                return;
            }

            for blocked in state.live.values_mut() {
                *blocked = false;
            }
            state.rounds += 1;
            state.step_pending = false;
            debug!(
                "granted round {} to {} bug(s)",
                state.rounds,
                state.live.len()
            );
            drop(state);
            self.cvar.notify_all();
        }
    }

    /// Sleep for the configured pause, waking early on kill. A pause changed
    /// while sleeping takes effect immediately.
    fn sleep_between_rounds(&self) -> MutexGuard<'_, ControlState> {
        let started = Instant::now();
        let mut state = lock(&self.state);
        loop {
            let elapsed = started.elapsed();
            if state.killed || elapsed >= state.pause {
                return state;
            }
            let remaining = state.pause - elapsed;
            state = self
                .cvar
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    // =========================================================================
    // Waiting
    // =========================================================================

    /// Wait until no round is in flight: every live bug is parked and no
    /// grant is pending, or nobody is live, or kill was asserted.
    ///
    /// Returns `false` on timeout. While continuous permission is asserted a
    /// new round is always pending, so this only succeeds once the run ends.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.wait_for(timeout, |s| {
            s.killed || s.live.is_empty() || (s.all_blocked() && !s.may_grant())
        })
    }

    /// Wait until every bug has left the live set. Returns `false` on timeout.
    pub fn wait_until_finished(&self, timeout: Duration) -> bool {
        self.wait_for(timeout, |s| s.live.is_empty())
    }

    fn wait_for<F>(&self, timeout: Duration, done: F) -> bool
    where
        F: Fn(&ControlState) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut state = lock(&self.state);
        while !done(&state) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .cvar
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const WAIT: Duration = Duration::from_secs(5);

    fn fast() -> RunConfig {
        RunConfig {
            pause_ms: 0,
            start_running: false,
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = RunConfig::from_json("{}").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.pause_ms, 250);
    }

    #[test]
    fn test_unsupervised_handshake_returns() {
        let control = Control::unsupervised();
        control.register(0);
        assert!(control.handshake(0).is_ok());
        control.kill();
        assert_eq!(control.handshake(0), Err(RuntimeError::Halted));
    }

    #[test]
    fn test_step_grants_one_round() {
        let control = Arc::new(Control::new(&fast()));
        control.register(0);
        control.register(1);

        let driver = {
            let control = Arc::clone(&control);
            thread::spawn(move || control.run_rounds())
        };

        let workers: Vec<_> = (0..2)
            .map(|id| {
                let control = Arc::clone(&control);
                thread::spawn(move || {
                    let mut actions = 0;
                    while control.get_work_permit(id).is_ok() {
                        actions += 1;
                        control.complete_current_task(id);
                    }
                    actions
                })
            })
            .collect();

        assert!(control.wait_until_idle(WAIT));
        assert_eq!(control.rounds(), 0);

        control.step();
        assert!(control.wait_until_idle(WAIT));
        assert_eq!(control.rounds(), 1);

        control.step();
        assert!(control.wait_until_idle(WAIT));
        assert_eq!(control.rounds(), 2);

        control.kill();
        driver.join().unwrap();
        for worker in workers {
            assert_eq!(worker.join().unwrap(), 2);
        }
    }

    #[test]
    fn test_terminated_bug_does_not_hold_barrier() {
        let control = Arc::new(Control::new(&fast()));
        control.register(0);
        control.register(1);
        control.run();

        let driver = {
            let control = Arc::clone(&control);
            thread::spawn(move || control.run_rounds())
        };

        // bug 1 leaves after its first permit; bug 0 takes three actions
        let quitter = {
            let control = Arc::clone(&control);
            thread::spawn(move || {
                control.get_work_permit(1).unwrap();
                control.terminate(1);
            })
        };
        let stayer = {
            let control = Arc::clone(&control);
            thread::spawn(move || {
                for _ in 0..3 {
                    control.get_work_permit(0).unwrap();
                    control.complete_current_task(0);
                }
                control.get_work_permit(0).unwrap();
                control.terminate(0);
            })
        };

        quitter.join().unwrap();
        stayer.join().unwrap();
        assert!(control.wait_until_finished(WAIT));
        driver.join().unwrap();
        assert_eq!(control.rounds(), 4);
    }

    #[test]
    fn test_kill_releases_waiters() {
        let control = Arc::new(Control::new(&fast()));
        control.register(7);
        let waiter = {
            let control = Arc::clone(&control);
            thread::spawn(move || control.get_work_permit(7))
        };
        control.kill();
        assert_eq!(waiter.join().unwrap(), Err(RuntimeError::Halted));
    }

    #[test]
    fn test_control_loop_exits_without_bugs() {
        let control = Control::new(&fast());
        control.run_rounds();
        assert_eq!(control.rounds(), 0);
    }
}
