//! Rate-paced symbol stream between a fast producer and a human-speed reader.
//!
//! A provider writes characters as fast as its backend delivers them; the
//! reader receives them no faster than a computed rate so that a UI renders
//! text like natural typing. Two regimes apply:
//!
//! - While the producer is still running, the reader drains the backlog
//!   within `total_ms_before_done`, but never slower than
//!   `min_speed_before_done`. A stalled producer therefore slows the
//!   reader down instead of stopping it.
//! - Once the producer has finished, whatever was queued at that moment is
//!   flushed within `total_ms_when_done`, never slower than
//!   `min_speed_when_done`.
//!
//! Speeds are expressed in symbols per millisecond.

use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

fn default_min_speed_before_done() -> f64 {
    15e-3
}

fn default_total_ms_before_done() -> f64 {
    1000.0
}

fn default_min_speed_when_done() -> f64 {
    20e-3
}

fn default_total_ms_when_done() -> f64 {
    500.0
}

fn default_capacity() -> usize {
    1000
}

/// Pacing constants. The defaults were tuned by eye for chat UIs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaceConfig {
    #[serde(default = "default_min_speed_before_done")]
    pub min_speed_before_done: f64,
    #[serde(default = "default_total_ms_before_done")]
    pub total_ms_before_done: f64,
    #[serde(default = "default_min_speed_when_done")]
    pub min_speed_when_done: f64,
    #[serde(default = "default_total_ms_when_done")]
    pub total_ms_when_done: f64,
    /// Queue capacity; the producer waits when this many symbols are unread.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for PaceConfig {
    fn default() -> Self {
        Self {
            min_speed_before_done: default_min_speed_before_done(),
            total_ms_before_done: default_total_ms_before_done(),
            min_speed_when_done: default_min_speed_when_done(),
            total_ms_when_done: default_total_ms_when_done(),
            capacity: default_capacity(),
        }
    }
}

enum Chunk {
    Symbol(char),
    /// Terminal marker; `None` is a clean end of stream.
    End(Option<ProviderError>),
}

#[derive(Default)]
struct Counters {
    remaining: AtomicI64,
    done: AtomicBool,
    remaining_when_done: AtomicI64,
}

/// Creates a connected writer/reader pair.
pub fn paced_stream(config: PaceConfig) -> (PacedWriter, PacedReader) {
    let (tx, rx) = mpsc::channel(config.capacity.max(1));
    let counters = Arc::new(Counters::default());
    let writer = PacedWriter {
        tx,
        counters: counters.clone(),
    };
    let reader = PacedReader {
        rx,
        counters,
        config,
        last_read: None,
        finished: false,
    };
    (writer, reader)
}

/// Producer half. Terminating consumes the writer, so a stream ends at most once.
///
/// Dropping a writer without calling [`done`](Self::done) or
/// [`fail`](Self::fail) ends the stream with [`ProviderError::StreamAborted`].
pub struct PacedWriter {
    tx: mpsc::Sender<Chunk>,
    counters: Arc<Counters>,
}

impl PacedWriter {
    /// Queues one symbol, waiting only while the queue is full.
    pub async fn write(&self, symbol: char) -> Result<(), ProviderError> {
        self.tx
            .send(Chunk::Symbol(symbol))
            .await
            .map_err(|_| ProviderError::ReaderClosed)?;
        self.counters.remaining.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub async fn write_str(&self, text: &str) -> Result<(), ProviderError> {
        for symbol in text.chars() {
            self.write(symbol).await?;
        }
        Ok(())
    }

    /// Ends the stream normally.
    pub async fn done(self) {
        self.finish(None).await;
    }

    /// Ends the stream with an error delivered after the queued symbols.
    pub async fn fail(self, error: ProviderError) {
        self.finish(Some(error)).await;
    }

    async fn finish(self, error: Option<ProviderError>) {
        if self.tx.send(Chunk::End(error)).await.is_err() {
            return;
        }
        self.counters.done.store(true, Ordering::SeqCst);
        let remaining = self.counters.remaining.load(Ordering::SeqCst);
        self.counters
            .remaining_when_done
            .store(remaining, Ordering::SeqCst);
    }
}

/// Consumer half. Not shareable: exactly one task reads.
pub struct PacedReader {
    rx: mpsc::Receiver<Chunk>,
    counters: Arc<Counters>,
    config: PaceConfig,
    last_read: Option<Instant>,
    finished: bool,
}

impl PacedReader {
    /// Returns the next symbol, paced.
    ///
    /// `None` marks a clean end of stream; `Some(Err(_))` is the terminal
    /// error. Nothing is delivered after either.
    pub async fn recv(&mut self) -> Option<Result<char, ProviderError>> {
        if self.finished {
            return None;
        }

        let symbol = match self.rx.recv().await {
            Some(Chunk::Symbol(symbol)) => symbol,
            Some(Chunk::End(None)) => {
                self.finished = true;
                return None;
            }
            Some(Chunk::End(Some(error))) => {
                self.finished = true;
                return Some(Err(error));
            }
            None => {
                self.finished = true;
                return Some(Err(ProviderError::StreamAborted));
            }
        };

        let now = Instant::now();
        let read_at = match self.last_read {
            Some(last_read) => {
                let due = last_read + self.interval();
                if due > now {
                    tokio::time::sleep_until(due).await;
                    // Anchor on the deadline, not the wake-up: the timer rounds up
                    // to whole milliseconds and the error would otherwise accumulate.
                    due
                } else {
                    now
                }
            }
            None => now,
        };

        self.counters.remaining.fetch_sub(1, Ordering::SeqCst);
        self.last_read = Some(read_at);
        Some(Ok(symbol))
    }

    /// Closes the stream early. The producer's next write fails with
    /// [`ProviderError::ReaderClosed`].
    pub fn close(&mut self) {
        self.rx.close();
        self.finished = true;
    }

    /// Time between two deliveries at the current target rate.
    fn interval(&self) -> Duration {
        let config = &self.config;
        let speed = if self.counters.done.load(Ordering::SeqCst) {
            let remaining = self.counters.remaining_when_done.load(Ordering::SeqCst).max(0);
            (remaining as f64 / config.total_ms_when_done).max(config.min_speed_when_done)
        } else {
            let remaining = self.counters.remaining.load(Ordering::SeqCst).max(0);
            (remaining as f64 / config.total_ms_before_done).max(config.min_speed_before_done)
        };
        if !speed.is_finite() || speed <= 0.0 {
            // misconfigured floors: deliver unpaced
            return Duration::ZERO;
        }
        Duration::from_secs_f64(1.0 / speed / 1000.0)
    }
}
