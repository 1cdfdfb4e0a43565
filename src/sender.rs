//! The transmit state machine: emits the break by switching the uart to a
//! slower baud rate for one character, times the mark after break with a
//! one-shot timer, then streams the slots, pacing packets to an optional
//! refresh rate.

use crate::consts::{
    DMX_BREAK_BAUD, DMX_MAX_PACKET_SIZE, DMX_MIN_PACKET_SIZE, DMX_SLOTS_BAUD,
    SERIAL_BREAK_TIME_US, SERIAL_MAB_TIME_US,
};
use crate::timer::OneShotTimer;
use crate::uart_driver::{DmxUartDriver, SerialFormat, SERIAL_8N1, SERIAL_8N2};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum XmitState {
    /// Nothing queued for the wire.
    Idle,
    /// The break character is shifting out.
    Break,
    /// Waiting out the mark after break on the one-shot timer.
    Mab,
    /// Slots are streaming.
    Data,
}

/// A DMX transmitter for one uart port.
///
/// Event methods are called at interrupt priority through the
/// [crate::registry] trampolines; application writes go through the same
/// [crate::registry::PortCell], which serializes them against the interrupt
/// side. The outgoing packet is latched when transmission of its break
/// starts, so writes always take effect on a packet boundary.
pub struct Sender<D: DmxUartDriver, T: OneShotTimer> {
    driver: D,
    timer: T,
    began: bool,
    state: XmitState,
    output_buf: [u8; DMX_MAX_PACKET_SIZE],
    shot_buf: [u8; DMX_MAX_PACKET_SIZE],
    output_index: usize,
    packet_size: usize,
    shot_size: usize,
    break_time_us: u32,
    mab_time_us: u32,
    adjusted_mab_time_us: u32,
    break_baud: u32,
    break_format: SerialFormat,
    refresh_rate: f32,
    /// Minimum break-to-break distance; 0 = full speed, `u32::MAX` =
    /// transmission disabled.
    min_break_to_break_us: u32,
    break_start_time: u32,
    have_break_start: bool,
    paused: bool,
    /// Packets still allowed before pause re-engages; 0 = unlimited.
    resume_counter: u32,
    transmitting: bool,
    done_tx_fn: Option<fn()>,
    packet_count: u32,
}

impl<D: DmxUartDriver, T: OneShotTimer> Sender<D, T> {
    pub fn new(driver: D, timer: T) -> Self {
        let adjust = driver.capabilities().mab_timer_adjust_us;
        Self {
            driver,
            timer,
            began: false,
            state: XmitState::Idle,
            output_buf: [0; DMX_MAX_PACKET_SIZE],
            shot_buf: [0; DMX_MAX_PACKET_SIZE],
            output_index: 0,
            packet_size: DMX_MAX_PACKET_SIZE,
            shot_size: DMX_MAX_PACKET_SIZE,
            break_time_us: SERIAL_BREAK_TIME_US,
            mab_time_us: SERIAL_MAB_TIME_US,
            adjusted_mab_time_us: SERIAL_MAB_TIME_US.saturating_sub(adjust),
            break_baud: DMX_BREAK_BAUD,
            break_format: SERIAL_8N1,
            refresh_rate: f32::INFINITY,
            min_break_to_break_us: 0,
            break_start_time: 0,
            have_break_start: false,
            paused: false,
            resume_counter: 0,
            transmitting: false,
            done_tx_fn: None,
            packet_count: 0,
        }
    }

    /// Start transmitting. Both serial parameter sets are validated here so
    /// the interrupt paths can reconfigure without error handling.
    pub fn begin(&mut self) -> Result<(), D::Error> {
        if self.began {
            return Ok(());
        }
        self.packet_count = 0;
        self.transmitting = false;
        self.state = XmitState::Idle;
        self.output_index = 0;
        self.have_break_start = false;

        self.driver.configure(self.break_baud, self.break_format)?;
        self.driver.configure(DMX_SLOTS_BAUD, SERIAL_8N2)?;
        self.driver.tx_enable(true);
        self.driver.tx_enable_complete_interrupt(false);
        self.driver.tx_enable_data_interrupt(true);
        self.began = true;
        Ok(())
    }

    /// Stop transmitting. Interrupt sources go first so no event fires
    /// after this returns.
    pub fn end(&mut self) {
        if !self.began {
            return;
        }
        self.began = false;
        self.driver.tx_enable_data_interrupt(false);
        self.driver.tx_enable_complete_interrupt(false);
        self.timer.cancel();
        self.driver.tx_enable(false);
        self.state = XmitState::Idle;
        self.transmitting = false;
    }

    // -----------------------------------------------------------------
    //  Interrupt-side event handlers
    // -----------------------------------------------------------------

    /// The transmit data register is empty.
    pub fn transmit_data_ready(&mut self, now: u32) {
        match self.state {
            XmitState::Idle => {
                if self.paused || self.min_break_to_break_us == u32::MAX {
                    self.driver.tx_enable_data_interrupt(false);
                    return;
                }
                if self.have_break_start {
                    let elapsed = now.wrapping_sub(self.break_start_time);
                    if elapsed < self.min_break_to_break_us {
                        self.driver.tx_enable_data_interrupt(false);
                        self.timer.arm(self.min_break_to_break_us - elapsed);
                        return;
                    }
                }
                self.start_break(now);
            },
            XmitState::Break | XmitState::Mab => {},
            XmitState::Data => {
                if self.output_index < self.shot_size {
                    let b = self.shot_buf[self.output_index];
                    self.output_index += 1;
                    self.driver.tx_write_byte(b);
                }
                if self.output_index >= self.shot_size {
                    self.driver.tx_enable_data_interrupt(false);
                    self.driver.tx_enable_complete_interrupt(true);
                }
            },
        }
    }

    /// The stop bits of the last written character left the shift register.
    pub fn transmit_complete(&mut self, _now: u32) {
        match self.state {
            XmitState::Break => {
                let _ = self.driver.configure(DMX_SLOTS_BAUD, SERIAL_8N2);
                self.driver.tx_enable_complete_interrupt(false);
                self.state = XmitState::Mab;
                self.timer.arm(self.adjusted_mab_time_us);
            },
            XmitState::Data => {
                self.driver.tx_enable_complete_interrupt(false);
                self.complete_packet();
            },
            _ => {},
        }
    }

    /// The one-shot timer fired: either the mark after break is over or the
    /// refresh-rate gate opened.
    pub fn timer_expired(&mut self, _now: u32) {
        match self.state {
            XmitState::Mab => {
                self.output_index = 0;
                self.state = XmitState::Data;
                self.driver.tx_enable_data_interrupt(true);
            },
            XmitState::Idle => {
                self.driver.tx_enable_data_interrupt(true);
            },
            _ => {},
        }
    }

    // -----------------------------------------------------------------
    //  Application-side API
    // -----------------------------------------------------------------

    /// Set one channel. Channel zero is the start code.
    pub fn set(&mut self, channel: usize, value: u8) -> bool {
        if channel >= DMX_MAX_PACKET_SIZE {
            return false;
        }
        self.output_buf[channel] = value;
        true
    }

    /// Set a range of channels.
    pub fn set_values(&mut self, start_channel: usize, values: &[u8]) -> bool {
        if start_channel >= DMX_MAX_PACKET_SIZE
            || values.len() > DMX_MAX_PACKET_SIZE - start_channel
        {
            return false;
        }
        self.output_buf[start_channel..start_channel + values.len()].copy_from_slice(values);
        true
    }

    /// Set a 16-bit value as a big-endian pair.
    pub fn set_16bit(&mut self, channel: usize, value: u16) -> bool {
        if channel >= DMX_MAX_PACKET_SIZE - 1 {
            return false;
        }
        let bytes = value.to_be_bytes();
        self.output_buf[channel] = bytes[0];
        self.output_buf[channel + 1] = bytes[1];
        true
    }

    /// Set consecutive 16-bit values, two channels each.
    pub fn set_16bit_values(&mut self, start_channel: usize, values: &[u16]) -> bool {
        if start_channel >= DMX_MAX_PACKET_SIZE
            || values.len() * 2 > DMX_MAX_PACKET_SIZE - start_channel
        {
            return false;
        }
        let mut channel = start_channel;
        for &value in values {
            let bytes = value.to_be_bytes();
            self.output_buf[channel] = bytes[0];
            self.output_buf[channel + 1] = bytes[1];
            channel += 2;
        }
        true
    }

    /// Zero all channels including the start code.
    pub fn clear(&mut self) {
        self.output_buf.fill(0);
    }

    /// Number of slots to transmit, start code included. Valid range is
    /// 25 to 513; the default is 513.
    pub fn set_packet_size(&mut self, size: usize) -> bool {
        if !(DMX_MIN_PACKET_SIZE..=DMX_MAX_PACKET_SIZE).contains(&size) {
            return false;
        }
        self.packet_size = size;
        true
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Break duration, generated by transmitting one 0x00 character at a
    /// baud rate that holds the line low for nine bit times. Rejected when
    /// outside the device's generation limits.
    pub fn set_break_time(&mut self, break_time_us: u32) -> bool {
        let caps = self.driver.capabilities();
        if break_time_us < caps.min_break_time_us || break_time_us > caps.max_break_time_us {
            return false;
        }
        self.break_time_us = break_time_us;
        self.break_baud = 9 * 1_000_000 / break_time_us;
        self.break_format = SERIAL_8N1;
        true
    }

    pub fn break_time(&self) -> u32 {
        self.break_time_us
    }

    /// Mark-after-break duration. The device's timer-arming latency is
    /// subtracted from the value actually armed; the stop bit of the break
    /// character imposes a physical floor.
    pub fn set_mab_time(&mut self, mab_time_us: u32) {
        let adjust = self.driver.capabilities().mab_timer_adjust_us;
        self.mab_time_us = mab_time_us;
        self.adjusted_mab_time_us = mab_time_us.saturating_sub(adjust);
    }

    pub fn mab_time(&self) -> u32 {
        self.mab_time_us
    }

    /// Packets per second. `f32::INFINITY` transmits back to back, 0.0
    /// stops transmission entirely. NaN and negative rates are rejected.
    pub fn set_refresh_rate(&mut self, rate: f32) -> bool {
        if rate.is_nan() || rate < 0.0 {
            return false;
        }
        let was_disabled = self.min_break_to_break_us == u32::MAX;
        if rate == 0.0 {
            self.min_break_to_break_us = u32::MAX;
        } else if rate.is_infinite() {
            self.min_break_to_break_us = 0;
        } else {
            self.min_break_to_break_us = (1_000_000.0 / rate) as u32;
        }
        if was_disabled && self.min_break_to_break_us != u32::MAX && self.began && !self.paused {
            self.driver.tx_enable_data_interrupt(true);
        }
        self.refresh_rate = rate;
        true
    }

    pub fn refresh_rate(&self) -> f32 {
        self.refresh_rate
    }

    /// Stop looping once the packet currently on the wire completes.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume transmitting indefinitely.
    pub fn resume(&mut self) {
        let done = self.done_tx_fn;
        self.resume_for_with(0, done);
    }

    /// Resume for exactly `n` packets, then pause again. `n` of zero
    /// resumes indefinitely.
    pub fn resume_for(&mut self, n: u32) {
        let done = self.done_tx_fn;
        self.resume_for_with(n, done);
    }

    /// Like [resume_for](Sender::resume_for), also installing the callback
    /// invoked when a packet completes while the sender is paused.
    pub fn resume_for_with(&mut self, n: u32, done: Option<fn()>) {
        self.resume_counter = n;
        if self.paused {
            if !self.transmitting {
                self.driver.tx_enable_data_interrupt(true);
            }
            self.paused = false;
        }
        self.done_tx_fn = done;
    }

    /// True iff the sender is not paused or a packet is still in flight.
    pub fn is_transmitting(&self) -> bool {
        !self.paused || self.transmitting
    }

    pub fn packet_count(&self) -> u32 {
        self.packet_count
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Tear down and hand back the hardware resources.
    pub fn release(mut self) -> (D, T) {
        self.end();
        (self.driver, self.timer)
    }

    // -----------------------------------------------------------------
    //  Internals
    // -----------------------------------------------------------------

    fn start_break(&mut self, now: u32) {
        if self.resume_counter > 0 {
            self.resume_counter -= 1;
            if self.resume_counter == 0 {
                self.paused = true;
            }
        }
        self.transmitting = true;
        self.shot_size = self.packet_size;
        self.shot_buf.copy_from_slice(&self.output_buf);
        self.break_start_time = now;
        self.have_break_start = true;

        let _ = self.driver.configure(self.break_baud, self.break_format);
        self.driver.tx_enable_data_interrupt(false);
        self.driver.tx_enable_complete_interrupt(true);
        self.driver.tx_write_byte(0x00);
        self.state = XmitState::Break;
    }

    fn complete_packet(&mut self) {
        self.packet_count = self.packet_count.wrapping_add(1);
        self.output_index = 0;
        self.transmitting = false;
        self.state = XmitState::Idle;
        if self.paused {
            self.driver.tx_enable_data_interrupt(false);
            if let Some(done) = self.done_tx_fn {
                done();
            }
        } else {
            self.driver.tx_enable_data_interrupt(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uart_driver::UartCapabilities;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::vec::Vec;

    #[derive(Default)]
    struct MockUart {
        baud: u32,
        format: Option<SerialFormat>,
        configs: Vec<(u32, SerialFormat)>,
        writes: Vec<(u32, SerialFormat, u8)>,
        data_irq: bool,
        complete_irq: bool,
        tx_enabled: bool,
        caps: UartCapabilities,
    }

    impl MockUart {
        fn with_caps(caps: UartCapabilities) -> Self {
            Self {
                caps,
                ..Self::default()
            }
        }
    }

    impl DmxUartDriver for MockUart {
        type Error = core::convert::Infallible;

        fn capabilities(&self) -> UartCapabilities {
            self.caps
        }

        fn configure(&mut self, baud: u32, format: SerialFormat) -> Result<(), Self::Error> {
            self.baud = baud;
            self.format = Some(format);
            self.configs.push((baud, format));
            Ok(())
        }

        fn rx_enable(&mut self, _enable: bool) {}

        fn tx_enable(&mut self, enable: bool) {
            self.tx_enabled = enable;
        }

        fn set_tx_not_rx(&mut self, _tx: bool) {}

        fn rx_pending(&self) -> bool {
            false
        }

        fn read_byte(&mut self) -> u8 {
            0
        }

        fn tx_write_byte(&mut self, b: u8) {
            self.writes.push((self.baud, self.format.unwrap(), b));
        }

        fn tx_raw(&mut self, _frame: &[u8]) -> Result<(), Self::Error> {
            Ok(())
        }

        fn tx_break(&mut self, _break_time_us: u32, _mab_time_us: u32) -> Result<(), Self::Error> {
            Ok(())
        }

        fn tx_enable_data_interrupt(&mut self, enable: bool) {
            self.data_irq = enable;
        }

        fn tx_enable_complete_interrupt(&mut self, enable: bool) {
            self.complete_irq = enable;
        }

        fn set_idle_line_type(&mut self, _idle_type: crate::uart_driver::IdleLineType) {}

        fn now_us(&self) -> u32 {
            0
        }

        fn now_ms(&self) -> u32 {
            0
        }
    }

    #[derive(Default)]
    struct MockTimer {
        armed: Option<u32>,
        arm_count: u32,
        cancel_count: u32,
    }

    impl OneShotTimer for MockTimer {
        fn arm(&mut self, delay_us: u32) {
            self.armed = Some(delay_us);
            self.arm_count += 1;
        }

        fn cancel(&mut self) {
            self.armed = None;
            self.cancel_count += 1;
        }
    }

    type TestSender = Sender<MockUart, MockTimer>;

    fn sender() -> TestSender {
        let mut s = Sender::new(MockUart::default(), MockTimer::default());
        s.begin().unwrap();
        s
    }

    fn char_us(baud: u32, format: SerialFormat) -> u32 {
        let bits = 1 + format.data_bits as u32 + format.stop_bits as u32;
        bits * (1_000_000 / baud)
    }

    /// Discrete-event model of the uart shifting characters and the
    /// one-shot timer, driving the sender the way the hardware would.
    #[derive(Default)]
    struct Sim {
        now: u32,
        busy_until: Option<u32>,
        timer_deadline: Option<u32>,
        seen_arms: u32,
        /// Times at which a break character started.
        breaks: Vec<u32>,
    }

    impl Sim {
        fn sync_timer(&mut self, s: &TestSender) {
            if s.timer.arm_count != self.seen_arms {
                self.seen_arms = s.timer.arm_count;
                self.timer_deadline = s.timer.armed.map(|d| self.now + d);
            } else if s.timer.armed.is_none() {
                self.timer_deadline = None;
            }
        }

        /// Deliver the next hardware event. Returns false once quiescent.
        fn step(&mut self, s: &mut TestSender) -> bool {
            if s.driver.data_irq && self.busy_until.is_none() {
                let writes_before = s.driver.writes.len();
                s.transmit_data_ready(self.now);
                self.sync_timer(s);
                if s.driver.writes.len() > writes_before {
                    let &(baud, format, _) = s.driver.writes.last().unwrap();
                    if baud != DMX_SLOTS_BAUD {
                        self.breaks.push(self.now);
                    }
                    self.busy_until = Some(self.now + char_us(baud, format));
                    return true;
                }
                // no byte: the handler disabled the interrupt or is gating
                return !s.driver.data_irq || self.timer_deadline.is_some();
            }
            if let Some(done) = self.busy_until {
                if self.timer_deadline.map_or(true, |d| done <= d) {
                    self.now = done;
                    self.busy_until = None;
                    if s.driver.complete_irq {
                        s.transmit_complete(self.now);
                        self.sync_timer(s);
                    }
                    return true;
                }
            }
            if let Some(deadline) = self.timer_deadline {
                self.now = deadline;
                self.timer_deadline = None;
                s.timer_expired(self.now);
                self.sync_timer(s);
                return true;
            }
            false
        }

        fn run_until_quiescent(&mut self, s: &mut TestSender) {
            for _ in 0..100_000 {
                if !self.step(s) {
                    return;
                }
            }
            panic!("sender simulation did not settle");
        }

        fn run_until_packets(&mut self, s: &mut TestSender, n: usize) {
            for _ in 0..1_000_000 {
                if self.breaks.len() >= n && s.state == XmitState::Idle {
                    return;
                }
                assert!(self.step(s), "sender went quiescent early");
            }
            panic!("sender simulation did not finish {n} packets");
        }
    }

    /// Slot bytes per packet, split at the break characters.
    fn packets(s: &TestSender) -> Vec<Vec<u8>> {
        let mut packets: Vec<Vec<u8>> = Vec::new();
        for &(baud, _, b) in &s.driver.writes {
            if baud != DMX_SLOTS_BAUD {
                packets.push(Vec::new());
            } else if let Some(last) = packets.last_mut() {
                last.push(b);
            }
        }
        packets
    }

    #[test]
    fn test_wire_image_matches_channel_writes() {
        let mut s = sender();
        assert!(s.set(1, 0x11));
        assert!(s.set(512, 0xFE));
        assert!(s.set_16bit(100, 0x1234));

        let mut sim = Sim::default();
        sim.run_until_packets(&mut s, 1);

        let packets = packets(&s);
        assert_eq!(packets.len(), 1);
        let wire = &packets[0];
        assert_eq!(wire.len(), DMX_MAX_PACKET_SIZE);
        assert_eq!(wire[0], 0x00);
        assert_eq!(wire[1], 0x11);
        assert_eq!(wire[100], 0x12);
        assert_eq!(wire[101], 0x34);
        assert_eq!(wire[512], 0xFE);
        assert_eq!(s.packet_count(), 1);

        // break at 50 kbaud 8N1, slots at 250 kbaud 8N2
        let &(break_baud, break_format, break_char) = &s.driver.writes[0];
        assert_eq!(break_baud, DMX_BREAK_BAUD);
        assert_eq!(break_format, SERIAL_8N1);
        assert_eq!(break_char, 0x00);
    }

    #[test]
    fn test_set_during_packet_lands_in_next_packet() {
        let mut s = sender();
        s.set(2, 0x55);

        let mut sim = Sim::default();
        // run into the middle of the first packet's slot stream
        while s.driver.writes.len() < 10 {
            assert!(sim.step(&mut s));
        }
        s.set(2, 0xEE);
        sim.run_until_packets(&mut s, 2);

        let packets = packets(&s);
        assert_eq!(packets[0][2], 0x55);
        assert_eq!(packets[1][2], 0xEE);
    }

    #[test]
    fn test_mab_timer_armed_between_break_and_slots() {
        let mut s = sender();
        let mut sim = Sim::default();

        // deliver events until the break character has shifted out
        while s.state != XmitState::Mab {
            assert!(sim.step(&mut s));
        }
        assert_eq!(s.timer.armed, Some(SERIAL_MAB_TIME_US));
        // no slot may be written before the timer fires
        assert_eq!(s.driver.writes.len(), 1);
        assert!(!s.driver.data_irq);

        sim.run_until_packets(&mut s, 1);
        assert_eq!(packets(&s)[0].len(), DMX_MAX_PACKET_SIZE);
    }

    #[test]
    fn test_mab_timer_adjust_from_capabilities() {
        let caps = UartCapabilities {
            mab_timer_adjust_us: 4,
            ..UartCapabilities::default()
        };
        let mut s = Sender::new(MockUart::with_caps(caps), MockTimer::default());
        assert_eq!(s.adjusted_mab_time_us, SERIAL_MAB_TIME_US - 4);

        s.set_mab_time(30);
        assert_eq!(s.mab_time(), 30);
        assert_eq!(s.adjusted_mab_time_us, 26);

        // an adjust larger than the request clamps to zero
        s.set_mab_time(2);
        assert_eq!(s.adjusted_mab_time_us, 0);
    }

    #[test]
    fn test_refresh_rate_paces_breaks() {
        let mut s = sender();
        assert!(s.set_refresh_rate(40.0));

        let mut sim = Sim::default();
        sim.run_until_packets(&mut s, 4);

        for pair in sim.breaks.windows(2) {
            assert_eq!(pair[1] - pair[0], 25_000);
        }
    }

    #[test]
    fn test_full_speed_packets_run_back_to_back() {
        let mut s = sender();
        let mut sim = Sim::default();
        sim.run_until_packets(&mut s, 3);

        // break char (200us) + mark (20us) + 513 slots (44us each)
        let expected = 200 + 20 + 513 * 44;
        for pair in sim.breaks.windows(2) {
            assert_eq!(pair[1] - pair[0], expected);
        }
    }

    static DONE: AtomicU32 = AtomicU32::new(0);

    fn count_done() {
        DONE.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn test_resume_for_sends_exactly_n_packets() {
        let mut s = sender();
        s.pause();

        let mut sim = Sim::default();
        sim.run_until_quiescent(&mut s);
        assert!(sim.breaks.is_empty());
        assert!(!s.is_transmitting());

        s.resume_for_with(3, Some(count_done));
        assert!(s.is_transmitting());
        sim.run_until_quiescent(&mut s);

        assert_eq!(sim.breaks.len(), 3);
        assert_eq!(s.packet_count(), 3);
        assert_eq!(DONE.load(Ordering::Relaxed), 1);
        assert!(!s.is_transmitting());
    }

    #[test]
    fn test_resume_after_pause_continues_indefinitely() {
        let mut s = sender();
        s.pause();
        let mut sim = Sim::default();
        sim.run_until_quiescent(&mut s);

        s.resume();
        sim.run_until_packets(&mut s, 5);
        assert!(s.packet_count() >= 5);
    }

    #[test]
    fn test_refresh_rate_zero_stops_transmission() {
        let mut s = sender();
        assert!(s.set_refresh_rate(0.0));

        let mut sim = Sim::default();
        sim.run_until_quiescent(&mut s);
        assert!(sim.breaks.is_empty());

        // restoring a rate re-kicks the transmit interrupt
        assert!(s.set_refresh_rate(f32::INFINITY));
        sim.run_until_packets(&mut s, 1);
        assert_eq!(s.packet_count(), 1);
    }

    #[test]
    fn test_refresh_rate_rejects_nan_and_negative() {
        let mut s = sender();
        assert!(!s.set_refresh_rate(f32::NAN));
        assert!(!s.set_refresh_rate(-1.0));
        assert_eq!(s.refresh_rate(), f32::INFINITY);
    }

    #[test]
    fn test_packet_size_bounds() {
        let mut s = sender();
        assert!(!s.set_packet_size(DMX_MIN_PACKET_SIZE - 1));
        assert!(!s.set_packet_size(DMX_MAX_PACKET_SIZE + 1));
        assert_eq!(s.packet_size(), DMX_MAX_PACKET_SIZE);

        assert!(s.set_packet_size(DMX_MIN_PACKET_SIZE));
        let mut sim = Sim::default();
        sim.run_until_packets(&mut s, 1);
        assert_eq!(packets(&s)[0].len(), DMX_MIN_PACKET_SIZE);
    }

    #[test]
    fn test_channel_write_bounds() {
        let mut s = sender();
        assert!(!s.set(DMX_MAX_PACKET_SIZE, 1));
        assert!(s.set(DMX_MAX_PACKET_SIZE - 1, 1));

        assert!(s.set_values(510, &[1, 2, 3]));
        assert!(!s.set_values(511, &[1, 2, 3]));
        assert!(s.set_values(0, &[]));

        assert!(s.set_16bit(511, 0xBEEF));
        assert!(!s.set_16bit(512, 0xBEEF));

        assert!(s.set_16bit_values(509, &[0x0102, 0x0304]));
        assert!(!s.set_16bit_values(510, &[0x0102, 0x0304]));
        assert_eq!(s.output_buf[509..513], [0x01, 0x02, 0x03, 0x04]);

        s.clear();
        assert!(s.output_buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_break_time_recomputes_baud_and_honors_limits() {
        let mut s = sender();
        assert!(s.set_break_time(100));
        assert_eq!(s.break_time(), 100);
        assert_eq!(s.break_baud, 90_000);

        // below the device minimum, state unchanged
        assert!(!s.set_break_time(50));
        assert_eq!(s.break_time(), 100);
    }

    #[test]
    fn test_end_silences_interrupts() {
        let mut s = sender();
        let mut sim = Sim::default();
        while s.driver.writes.len() < 5 {
            assert!(sim.step(&mut s));
        }
        s.end();
        assert!(!s.driver.data_irq);
        assert!(!s.driver.complete_irq);
        assert!(!s.driver.tx_enabled);
        assert!(s.timer.cancel_count > 0);
    }
}
