//! Send cadence and back-pressure.
//!
//! - `PacingScheduler`: decides, per display tick, whether to render and
//!   whether a frame send is due. It is the only thing that decides when
//!   to send.
//! - `InflightGuard`: single-permit gate allowing at most one unanswered
//!   frame. Admission is denied, never queued.

use std::time::{Duration, Instant};

/// What to do on one display tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickPlan {
    pub render: bool,
    pub send: bool,
}

impl TickPlan {
    pub const IDLE: TickPlan = TickPlan {
        render: false,
        send: false,
    };
}

pub struct PacingScheduler {
    interval: Duration,
    last_send_attempt: Option<Instant>,
    cancelled: bool,
}

impl PacingScheduler {
    /// `target_fps` of 0 is treated as 1.
    pub fn new(target_fps: u32) -> Self {
        let fps = target_fps.max(1);
        Self {
            interval: Duration::from_millis(1000 / fps as u64),
            last_send_attempt: None,
            cancelled: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Plan the tick at `now`.
    ///
    /// The send clock advances whenever `send` is returned true, whether or
    /// not the caller manages to send.
    pub fn on_tick(&mut self, now: Instant) -> TickPlan {
        if self.cancelled {
            return TickPlan::IDLE;
        }
        let send = match self.last_send_attempt {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if send {
            self.last_send_attempt = Some(now);
        }
        TickPlan { render: true, send }
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// The single outstanding request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InflightTicket {
    pub sequence: u64,
    pub sent_at: Instant,
}

pub struct InflightGuard {
    outstanding: Option<InflightTicket>,
    timeout: Option<Duration>,
    cancelled: bool,
}

impl InflightGuard {
    /// `timeout` bounds how long a permit may stay unanswered before it is
    /// reclaimed; `None` waits forever.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            outstanding: None,
            timeout,
            cancelled: false,
        }
    }

    /// Take the permit for frame `sequence`. Returns false when a frame is
    /// already outstanding or the guard was cancelled.
    pub fn try_admit(&mut self, sequence: u64, now: Instant) -> bool {
        if self.cancelled || self.outstanding.is_some() {
            return false;
        }
        self.outstanding = Some(InflightTicket {
            sequence,
            sent_at: now,
        });
        true
    }

    /// Return the permit. A release without an outstanding frame is a no-op.
    pub fn release(&mut self) -> Option<InflightTicket> {
        self.outstanding.take()
    }

    pub fn outstanding(&self) -> usize {
        usize::from(self.outstanding.is_some())
    }

    pub fn ticket(&self) -> Option<&InflightTicket> {
        self.outstanding.as_ref()
    }

    /// Reclaim a permit whose response never came.
    pub fn expire_stale(&mut self, now: Instant) -> Option<InflightTicket> {
        let timeout = self.timeout?;
        let ticket = self.outstanding?;
        if now.saturating_duration_since(ticket.sent_at) >= timeout {
            log::warn!(
                "InflightGuard: frame {} unanswered after {:?}, releasing",
                ticket.sequence,
                timeout
            );
            self.outstanding = None;
            return Some(ticket);
        }
        None
    }

    /// Drop any permit and refuse all later admissions.
    pub fn cancel(&mut self) {
        self.outstanding = None;
        self.cancelled = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn first_tick_sends_then_waits_for_interval() {
        let start = Instant::now();
        let mut scheduler = PacingScheduler::new(10);
        assert_eq!(scheduler.interval(), ms(100));

        assert!(scheduler.on_tick(start).send);
        let plan = scheduler.on_tick(start + ms(16));
        assert!(plan.render);
        assert!(!plan.send);
        assert!(!scheduler.on_tick(start + ms(99)).send);
        assert!(scheduler.on_tick(start + ms(100)).send);
        assert!(!scheduler.on_tick(start + ms(150)).send);
    }

    #[test]
    fn cancelled_scheduler_plans_nothing() {
        let start = Instant::now();
        let mut scheduler = PacingScheduler::new(15);
        scheduler.cancel();
        assert_eq!(scheduler.on_tick(start), TickPlan::IDLE);
        assert_eq!(scheduler.on_tick(start + ms(1000)), TickPlan::IDLE);
    }

    #[test]
    fn guard_admits_one_frame_at_a_time() {
        let now = Instant::now();
        let mut guard = InflightGuard::new(None);

        assert!(guard.try_admit(1, now));
        assert!(!guard.try_admit(2, now));
        assert_eq!(guard.outstanding(), 1);

        assert_eq!(guard.release().map(|t| t.sequence), Some(1));
        assert_eq!(guard.outstanding(), 0);
        assert!(guard.release().is_none());
        assert!(guard.try_admit(3, now));
    }

    #[test]
    fn stale_permit_is_reclaimed_after_timeout() {
        let now = Instant::now();
        let mut guard = InflightGuard::new(Some(ms(500)));
        assert!(guard.try_admit(9, now));

        assert!(guard.expire_stale(now + ms(499)).is_none());
        assert_eq!(guard.expire_stale(now + ms(500)).map(|t| t.sequence), Some(9));
        assert_eq!(guard.outstanding(), 0);
    }

    #[test]
    fn cancelled_guard_refuses_admission() {
        let now = Instant::now();
        let mut guard = InflightGuard::new(None);
        assert!(guard.try_admit(1, now));
        guard.cancel();
        assert_eq!(guard.outstanding(), 0);
        assert!(!guard.try_admit(2, now));
    }
}
