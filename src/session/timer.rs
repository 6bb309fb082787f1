//! Call Timer - Gesprächsdauer in ganzen Sekunden
//!
//! Der Timer zählt nur, solange der Anruf verbunden ist. Die Zeitquelle wird
//! über den `Clock`-Trait injiziert, damit Tests ohne echtes Warten laufen.

use parking_lot::Mutex;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// CLOCK
// ============================================================================

/// Monotone Zeitquelle
///
/// `None` bedeutet, dass die Uhr gerade nicht verfügbar ist. Der Timer bleibt
/// dann stehen, der Anruf selbst läuft weiter.
pub trait Clock: Send + Sync {
    fn now(&self) -> Option<Duration>;
}

/// Uhr auf Basis von `Instant`
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Option<Duration> {
        Some(self.origin.elapsed())
    }
}

/// Manuell gesteuerte Uhr für Tests und Simulationen
///
/// Klone teilen sich denselben Zeitstand.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Option<Duration>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Some(Duration::ZERO))),
        }
    }

    /// Stellt die Uhr um `by` vor (eine ausgefallene Uhr wird dabei wieder verfügbar)
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = Some(now.unwrap_or_default() + by);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    /// Simuliert eine nicht verfügbare Zeitquelle
    pub fn set_unavailable(&self) {
        *self.now.lock() = None;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Option<Duration> {
        *self.now.lock()
    }
}

// ============================================================================
// CALL TIMER
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Running {
    /// Uhrzeit beim (Wieder-)Start
    anchor: Duration,
    /// Bereits gezählte Sekunden beim (Wieder-)Start
    base: u64,
}

/// Zählt die verstrichenen Sekunden eines Anrufs
pub struct CallTimer {
    clock: Arc<dyn Clock>,
    elapsed: u64,
    running: Option<Running>,
    degraded: bool,
}

impl CallTimer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            elapsed: 0,
            running: None,
            degraded: false,
        }
    }

    /// Startet (oder setzt fort) die Zählung
    ///
    /// Bereits gezählte Sekunden bleiben erhalten.
    pub fn start(&mut self) {
        if self.running.is_some() {
            return;
        }

        match self.clock.now() {
            Some(anchor) => {
                self.running = Some(Running {
                    anchor,
                    base: self.elapsed,
                });
                self.degraded = false;
            }
            None => {
                tracing::warn!("Clock unavailable, call timer will not advance");
                self.degraded = true;
            }
        }
    }

    /// Hält die Zählung an
    ///
    /// Liefert die bis hierhin noch nicht gemeldeten Sekunden.
    pub fn stop(&mut self) -> RangeInclusive<u64> {
        let fresh = self.poll();
        self.running = None;
        fresh
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// True wenn die Uhr beim Start oder beim letzten Poll ausgefallen war
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    /// Liefert die seit dem letzten Poll neu verstrichenen Sekunden
    ///
    /// Jede Sekunde wird genau einmal geliefert, auch wenn der Tick verspätet kommt.
    pub fn poll(&mut self) -> RangeInclusive<u64> {
        let empty = 1..=0;

        let Some(running) = self.running else {
            return empty;
        };

        let Some(now) = self.clock.now() else {
            if !self.degraded {
                tracing::warn!("Clock became unavailable at {}s", self.elapsed);
            }
            self.degraded = true;
            return empty;
        };
        self.degraded = false;

        let total = running.base + now.saturating_sub(running.anchor).as_secs();
        if total <= self.elapsed {
            return empty;
        }

        let fresh = (self.elapsed + 1)..=total;
        self.elapsed = total;
        fresh
    }
}

impl std::fmt::Debug for CallTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallTimer")
            .field("elapsed", &self.elapsed)
            .field("running", &self.is_running())
            .field("degraded", &self.degraded)
            .finish()
    }
}

/// Formatiert Sekunden als `mm:ss` (bzw. `h:mm:ss` ab einer Stunde)
pub fn format_elapsed(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn timer() -> (ManualClock, CallTimer) {
        let clock = ManualClock::new();
        let timer = CallTimer::new(Arc::new(clock.clone()));
        (clock, timer)
    }

    #[test]
    fn test_does_not_count_before_start() {
        let (clock, mut timer) = timer();
        clock.advance_secs(30);
        assert!(timer.poll().is_empty());
        assert_eq!(timer.elapsed(), 0);
    }

    #[test]
    fn test_poll_yields_every_second_once() {
        let (clock, mut timer) = timer();
        timer.start();

        clock.advance_secs(3);
        assert_eq!(timer.poll().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(timer.poll().is_empty());

        clock.advance(Duration::from_millis(1500));
        assert_eq!(timer.poll().collect::<Vec<_>>(), vec![4]);
        clock.advance(Duration::from_millis(500));
        assert_eq!(timer.poll().collect::<Vec<_>>(), vec![5]);
        assert_eq!(timer.elapsed(), 5);
    }

    #[test]
    fn test_stop_and_resume_keeps_elapsed() {
        let (clock, mut timer) = timer();
        timer.start();
        clock.advance_secs(10);
        assert_eq!(timer.stop().count(), 10);
        assert_eq!(timer.elapsed(), 10);

        clock.advance_secs(100);
        assert!(timer.poll().is_empty());
        assert_eq!(timer.elapsed(), 10);

        timer.start();
        clock.advance_secs(5);
        assert_eq!(timer.poll().collect::<Vec<_>>(), vec![11, 12, 13, 14, 15]);
    }

    #[test]
    fn test_unavailable_clock_degrades_without_advancing() {
        let (clock, mut timer) = timer();
        clock.set_unavailable();
        timer.start();
        assert!(timer.is_degraded());
        assert!(!timer.is_running());
        assert!(timer.poll().is_empty());
        assert_eq!(timer.elapsed(), 0);
    }

    #[test]
    fn test_clock_outage_while_running() {
        let (clock, mut timer) = timer();
        timer.start();
        clock.advance_secs(2);
        let _ = timer.poll();

        clock.set_unavailable();
        assert!(timer.poll().is_empty());
        assert!(timer.is_degraded());
        assert_eq!(timer.elapsed(), 2);
    }

    #[test]
    fn test_stop_reports_unpolled_seconds() {
        let (clock, mut timer) = timer();
        timer.start();
        clock.advance_secs(899);
        assert_eq!(timer.poll().count(), 899);

        clock.advance_secs(2);
        assert_eq!(timer.stop().collect::<Vec<_>>(), vec![900, 901]);
        assert!(timer.stop().is_empty());
    }

    #[test]
    fn test_manual_clock_default_is_available() {
        assert_eq!(ManualClock::default().now(), Some(Duration::ZERO));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(905), "15:05");
        assert_eq!(format_elapsed(3725), "1:02:05");
    }
}
