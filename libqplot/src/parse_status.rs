use std::sync::mpsc::Sender;

use super::constants::PROGRESS_FLUSH_FRAC;

/// What happened to a buffer on a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseEvent {
    /// Fraction of the parse completed, in [0, 1]
    Progress(f32),
    /// Parse finished; all data and axis values are final
    Ready,
    /// A recovered fault the user should know about (missing sidecar, truncation, ...)
    Notice(String),
    /// The parse of this file was aborted
    Failed(String),
}

/// Message sent from a parse worker to whoever is watching (CLI, UI, tests).
#[derive(Debug, Clone, PartialEq)]
pub struct ParseStatus {
    pub worker_id: usize,
    pub buffer_index: usize,
    pub name: String,
    pub event: ParseEvent,
}

impl ParseStatus {
    pub fn new(worker_id: usize, buffer_index: usize, name: &str, event: ParseEvent) -> Self {
        Self {
            worker_id,
            buffer_index,
            name: name.to_string(),
            event,
        }
    }
}

/// Where a buffer reports its progress and notices during a parse.
///
/// A sink without a channel discards everything, which is what a buffer parsed
/// synchronously (or after its view went away) gets.
#[derive(Debug, Clone, Default)]
pub struct StatusSink {
    tx: Option<Sender<ParseStatus>>,
    worker_id: usize,
    buffer_index: usize,
    name: String,
}

impl StatusSink {
    pub fn new(tx: Sender<ParseStatus>, worker_id: usize, buffer_index: usize, name: &str) -> Self {
        Self {
            tx: Some(tx),
            worker_id,
            buffer_index,
            name: name.to_string(),
        }
    }

    /// A sink that drops every event
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn send(&self, event: ParseEvent) {
        if let Some(tx) = &self.tx {
            // A closed channel means the watcher is gone; the parse still completes
            if tx
                .send(ParseStatus::new(
                    self.worker_id,
                    self.buffer_index,
                    &self.name,
                    event,
                ))
                .is_err()
            {
                spdlog::debug!("Status watcher for {} disconnected", self.name);
            }
        }
    }

    pub fn notice(&self, message: String) {
        spdlog::warn!("{}: {}", self.name, message);
        self.send(ParseEvent::Notice(message));
    }
}

/// Turns raw step counts into monotone progress events.
///
/// Events are only emitted when the fraction advanced by at least [`PROGRESS_FLUSH_FRAC`],
/// values are clamped to [0, 1] and never go backwards.
#[derive(Debug)]
pub struct ProgressTracker<'a> {
    sink: &'a StatusSink,
    total: usize,
    last_sent: f32,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: &'a StatusSink, total: usize) -> Self {
        sink.send(ParseEvent::Progress(0.0));
        Self {
            sink,
            total,
            last_sent: 0.0,
        }
    }

    /// Report that `done` of the `total` steps are complete
    pub fn update(&mut self, done: usize) {
        let fraction = if self.total == 0 {
            1.0
        } else {
            (done as f32 / self.total as f32).clamp(0.0, 1.0)
        };
        if fraction - self.last_sent >= PROGRESS_FLUSH_FRAC {
            self.last_sent = fraction;
            self.sink.send(ParseEvent::Progress(fraction));
        }
    }

    /// Emit the final 1.0 if it was not already sent
    pub fn finish(&mut self) {
        if self.last_sent < 1.0 {
            self.last_sent = 1.0;
            self.sink.send(ParseEvent::Progress(1.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_progress_is_monotone_and_bounded() {
        let (tx, rx) = mpsc::channel();
        let sink = StatusSink::new(tx, 0, 3, "scan.dat");
        let mut tracker = ProgressTracker::new(&sink, 250);
        for done in [1, 5, 3, 100, 99, 400, 250] {
            tracker.update(done);
        }
        tracker.finish();
        drop(sink);

        let fractions: Vec<f32> = rx
            .iter()
            .map(|status| match status.event {
                ParseEvent::Progress(f) => f,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(fractions.first(), Some(&0.0));
        assert_eq!(fractions.last(), Some(&1.0));
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)));
    }

    #[test]
    fn test_detached_sink_drops_events() {
        let sink = StatusSink::detached();
        let mut tracker = ProgressTracker::new(&sink, 0);
        tracker.update(0);
        tracker.finish();
    }
}
