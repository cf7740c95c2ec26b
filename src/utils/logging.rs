//! Logging Module
//!
//! Structured logging on top of the `tracing` crate, plus the two progress
//! loggers used by curation and training.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::utils::error::{CropCareError, Result};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Verbose logging for debugging
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    /// Errors only
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }

    /// Plain output for the long-running HTTP service
    pub fn production() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: true,
            include_thread_ids: false,
            ansi_colors: false,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Parse a level name; unknown names fall back to `Info`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).map_err(|e| {
        CropCareError::Configuration(format!("Failed to initialize logging: {}", e))
    })
}

/// Progress logger for long-running loops over a known number of items
pub struct ProgressLogger {
    operation: String,
    total: usize,
    current: usize,
    /// Log every N items
    log_interval: usize,
    start_time: Instant,
}

impl ProgressLogger {
    pub fn new(operation: &str, total: usize) -> Self {
        Self {
            operation: operation.to_string(),
            total,
            current: 0,
            log_interval: (total / 10).max(1),
            start_time: Instant::now(),
        }
    }

    /// Create with custom log interval
    pub fn with_interval(mut self, interval: usize) -> Self {
        self.log_interval = interval.max(1);
        self
    }

    pub fn current(&self) -> usize {
        self.current
    }

    /// Update progress
    pub fn update(&mut self, count: usize) {
        self.current = count;

        if self.total == 0 {
            return;
        }

        if self.current % self.log_interval == 0 || self.current == self.total {
            let percentage = 100.0 * self.current as f64 / self.total as f64;
            let elapsed = self.start_time.elapsed().as_secs_f64();
            let items_per_sec = if elapsed > 0.0 {
                self.current as f64 / elapsed
            } else {
                0.0
            };

            tracing::info!(
                "{}: {}/{} ({:.1}%) - {:.1} items/s",
                self.operation,
                self.current,
                self.total,
                percentage,
                items_per_sec
            );
        }
    }

    /// Increment progress by 1
    pub fn increment(&mut self) {
        self.update(self.current + 1);
    }

    /// Log completion
    pub fn finish(&self) {
        tracing::info!(
            "{}: processed {} of {} items in {:.2}s",
            self.operation,
            self.current,
            self.total,
            self.start_time.elapsed().as_secs_f64()
        );
    }
}

/// Per-phase training progress logger
pub struct TrainingLogger {
    phase: String,
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    phase_start: Instant,
}

impl TrainingLogger {
    pub fn new(phase: &str, total_epochs: usize) -> Self {
        Self {
            phase: phase.to_string(),
            epoch: 0,
            total_epochs,
            epoch_start: Instant::now(),
            phase_start: Instant::now(),
        }
    }

    /// Log start of an epoch (0-indexed)
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();

        tracing::debug!(
            "[{}] Epoch {}/{} started",
            self.phase,
            epoch + 1,
            self.total_epochs
        );
    }

    /// Log end of an epoch with metrics
    pub fn end_epoch(&self, train_loss: f64, train_accuracy: f64, val_accuracy: f64, learning_rate: f64) {
        let epoch_time = self.epoch_start.elapsed();
        let total_time = self.phase_start.elapsed();

        let epochs_remaining = self.total_epochs.saturating_sub(self.epoch + 1);
        let avg_epoch_time = total_time.as_secs_f64() / (self.epoch + 1) as f64;
        let eta_secs = epochs_remaining as f64 * avg_epoch_time;

        tracing::info!(
            "[{}] Epoch {}/{} in {:.1}s | Loss: {:.4} | Train Acc: {:.2}% | Val Acc: {:.2}% | LR: {:.0e} | ETA: {:.0}s",
            self.phase,
            self.epoch + 1,
            self.total_epochs,
            epoch_time.as_secs_f64(),
            train_loss,
            train_accuracy * 100.0,
            val_accuracy * 100.0,
            learning_rate,
            eta_secs
        );
    }

    /// Log phase completion
    pub fn log_complete(&self, best_accuracy: f64) {
        tracing::info!(
            "[{}] complete: {} epochs in {:.1}s | Best val accuracy: {:.2}%",
            self.phase,
            self.total_epochs,
            self.phase_start.elapsed().as_secs_f64(),
            best_accuracy * 100.0
        );
    }
}
