//! Stop-button and safety-switch pause routines.
//!
//! Outside homing, both pauses end with a fresh start-button press and the
//! settle delay. During homing a safety pause resumes on its own as soon
//! as the switch closes again.

use super::rig::Guards;
use super::shared::{Shared, WAIT_POLL_MS};
use super::state::PauseKind;

/// Cancellation predicate threaded through every wait.
pub(crate) type Cancel<'a> = &'a mut dyn FnMut() -> bool;

/// Outcome of a guard check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Guard {
    /// Nothing happened
    Clear,
    /// A pause happened and has been released
    Resumed,
    /// Cancelled, possibly while paused
    Abort,
}

impl Guard {
    fn from_resumed(resumed: bool) -> Self {
        if resumed {
            Guard::Resumed
        } else {
            Guard::Abort
        }
    }
}

impl Guards {
    /// Check during automatic motion.
    pub(crate) fn check(&mut self, ctx: &Shared, settle_ms: u64, cancel: Cancel<'_>) -> Guard {
        if cancel() {
            return Guard::Abort;
        }
        if self.stop.poll() {
            return Guard::from_resumed(self.stop_pause(ctx, settle_ms, cancel));
        }
        if !self.safety.is_active() {
            return Guard::from_resumed(self.safety_pause(ctx, settle_ms, cancel));
        }
        Guard::Clear
    }

    /// Check during homing.
    pub(crate) fn check_homing(&mut self, ctx: &Shared, settle_ms: u64, cancel: Cancel<'_>) -> Guard {
        if cancel() {
            return Guard::Abort;
        }
        if !self.safety.is_active() {
            return Guard::from_resumed(self.wait_for_safety(ctx, cancel));
        }
        if self.stop.poll() {
            return Guard::from_resumed(self.stop_pause(ctx, settle_ms, cancel));
        }
        Guard::Clear
    }

    /// Halt, then wait for a start press and the settle delay.
    pub(crate) fn stop_pause(&mut self, ctx: &Shared, settle_ms: u64, cancel: Cancel<'_>) -> bool {
        self.halt();
        log::warn!("[{}] stop pressed, paused until start", ctx.logic);
        ctx.set_paused(Some(PauseKind::Stop));

        let resumed = self.wait_for_start(cancel) && self.settle(settle_ms, cancel);
        ctx.set_paused(None);
        if resumed {
            log::info!("[{}] resuming after stop", ctx.logic);
        }
        resumed
    }

    /// Halt, wait for the safety switch, then for a start press and the
    /// settle delay.
    pub(crate) fn safety_pause(&mut self, ctx: &Shared, settle_ms: u64, cancel: Cancel<'_>) -> bool {
        self.halt();
        log::warn!("[{}] safety switch open, motion halted", ctx.logic);
        ctx.set_paused(Some(PauseKind::Safety));

        let resumed = self.await_safety(cancel) && {
            log::info!("[{}] safety restored, press start to resume", ctx.logic);
            self.wait_for_start(cancel) && self.settle(settle_ms, cancel)
        };
        ctx.set_paused(None);
        if resumed {
            log::info!("[{}] resuming after safety pause", ctx.logic);
        }
        resumed
    }

    /// Halt and block until the safety switch is active again.
    pub(crate) fn wait_for_safety(&mut self, ctx: &Shared, cancel: Cancel<'_>) -> bool {
        self.halt();
        log::warn!("[{}] safety switch open, motion halted", ctx.logic);
        ctx.set_paused(Some(PauseKind::Safety));
        let restored = self.await_safety(cancel);
        ctx.set_paused(None);
        restored
    }

    fn await_safety(&mut self, cancel: Cancel<'_>) -> bool {
        loop {
            if cancel() {
                return false;
            }
            if self.safety.is_active() {
                return true;
            }
            self.sleep_ms(WAIT_POLL_MS);
        }
    }

    fn wait_for_start(&mut self, cancel: Cancel<'_>) -> bool {
        self.start.resync();
        loop {
            if cancel() {
                return false;
            }
            if self.start.poll() {
                return true;
            }
            self.sleep_ms(WAIT_POLL_MS);
        }
    }

    fn settle(&mut self, ms: u64, cancel: Cancel<'_>) -> bool {
        let mut left = ms;
        while left > 0 {
            if cancel() {
                return false;
            }
            let step = left.min(WAIT_POLL_MS);
            self.sleep_ms(step);
            left -= step;
        }
        !cancel()
    }
}
