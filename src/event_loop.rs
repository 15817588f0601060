//! Single-threaded cooperative timer queue.
//!
//! Events are plain messages with a deadline. `run` pops them in deadline order (insertion order
//! breaks ties) and hands each one to a handler, which may schedule further events. Nothing runs
//! in parallel, so handlers can mutate shared state without synchronization. Recurring work is
//! expressed by re-scheduling from the handler, never by recursion.

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    time::{Duration, Instant},
};

use crate::error::ReelResult;

/// How the loop waits for the next deadline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// Jump straight to the next deadline.
    #[default]
    Virtual,
    /// Sleep on the wall clock until the next deadline.
    Realtime,
}

struct Timer<E> {
    deadline: Duration,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Timer<E> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<E> Eq for Timer<E> {}

impl<E> PartialOrd for Timer<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Timer<E> {
    // Reversed: BinaryHeap is a max-heap and we want the earliest timer on top.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct EventLoop<E> {
    queue: BinaryHeap<Timer<E>>,
    next_seq: u64,
    now: Duration,
    clock: ClockMode,
    origin: Option<Instant>,
}

impl<E> EventLoop<E> {
    pub fn new(clock: ClockMode) -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_seq: 0,
            now: Duration::ZERO,
            clock,
            origin: None,
        }
    }

    /// Time of the event currently being handled, relative to the start of the loop.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Queue `event` to fire `delay` after the current time.
    pub fn schedule(&mut self, delay: Duration, event: E) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Timer {
            deadline: self.now + delay,
            seq,
            event,
        });
    }

    /// Queue `event` behind everything already due at the current time.
    pub fn defer(&mut self, event: E) {
        self.schedule(Duration::ZERO, event);
    }

    /// Dispatch events until the queue is empty. The first handler error aborts the loop and
    /// discards whatever is still queued.
    pub fn run<F>(&mut self, mut handler: F) -> ReelResult<()>
    where
        F: FnMut(&mut Self, E) -> ReelResult<()>,
    {
        let origin = *self.origin.get_or_insert_with(Instant::now);

        while let Some(timer) = self.queue.pop() {
            if self.clock == ClockMode::Realtime {
                let elapsed = origin.elapsed();
                if timer.deadline > elapsed {
                    std::thread::sleep(timer.deadline - elapsed);
                }
            }
            self.now = timer.deadline;

            if let Err(err) = handler(self, timer.event) {
                self.queue.clear();
                return Err(err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReelError;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn events_fire_in_deadline_then_insertion_order() {
        let mut lp = EventLoop::new(ClockMode::Virtual);
        lp.schedule(ms(30), "c");
        lp.schedule(ms(10), "a");
        lp.schedule(ms(30), "d");
        lp.schedule(ms(20), "b");

        let mut seen = Vec::new();
        lp.run(|lp, ev| {
            seen.push((lp.now(), ev));
            Ok(())
        })
        .unwrap();

        assert_eq!(
            seen,
            vec![(ms(10), "a"), (ms(20), "b"), (ms(30), "c"), (ms(30), "d")]
        );
    }

    #[test]
    fn rearming_from_handler_repeats_until_stopped() {
        let mut lp = EventLoop::new(ClockMode::Virtual);
        lp.schedule(Duration::ZERO, 0u32);

        let mut fired = Vec::new();
        lp.run(|lp, n| {
            fired.push(lp.now());
            if n < 4 {
                lp.schedule(ms(100), n + 1);
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(fired, vec![ms(0), ms(100), ms(200), ms(300), ms(400)]);
        assert_eq!(lp.pending(), 0);
    }

    #[test]
    fn defer_runs_after_events_already_due_now() {
        #[derive(Debug, PartialEq)]
        enum Ev {
            Stop,
            FinishStop,
            Tick,
        }

        let mut lp = EventLoop::new(ClockMode::Virtual);
        lp.schedule(ms(50), Ev::Stop);
        lp.schedule(ms(50), Ev::Tick);

        let mut order = Vec::new();
        lp.run(|lp, ev| {
            if ev == Ev::Stop {
                lp.defer(Ev::FinishStop);
            }
            order.push(ev);
            Ok(())
        })
        .unwrap();
        assert_eq!(order, vec![Ev::Stop, Ev::Tick, Ev::FinishStop]);
    }

    #[test]
    fn handler_error_aborts_and_clears_queue() {
        let mut lp = EventLoop::new(ClockMode::Virtual);
        lp.schedule(ms(1), 1);
        lp.schedule(ms(2), 2);
        lp.schedule(ms(3), 3);

        let mut seen = Vec::new();
        let res = lp.run(|_, n| {
            seen.push(n);
            if n == 2 {
                return Err(ReelError::validation("boom"));
            }
            Ok(())
        });
        assert!(res.is_err());
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(lp.pending(), 0);
    }

    #[test]
    fn realtime_clock_waits_for_deadlines() {
        let mut lp = EventLoop::new(ClockMode::Realtime);
        lp.schedule(ms(20), ());
        let start = Instant::now();
        lp.run(|_, _| Ok(())).unwrap();
        assert!(start.elapsed() >= ms(20));
    }
}
