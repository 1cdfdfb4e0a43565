//! One-shot microsecond timer used by the sender to time the mark after
//! break and by the receiver as its idle watchdog.

/// A one-shot timer with microsecond resolution.
///
/// Expiry is reported through [crate::registry::rx_timer_expired] or
/// [crate::registry::tx_timer_expired] by the platform's timer interrupt.
pub trait OneShotTimer {
    /// Arm the timer to fire once after `delay_us`. Arming is idempotent:
    /// a pending deadline is replaced, never duplicated.
    fn arm(&mut self, delay_us: u32);

    /// Cancel a pending deadline, if any.
    fn cancel(&mut self);
}
