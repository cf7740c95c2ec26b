//! Utilities: error types, logging and small formatting helpers

pub mod error;
pub mod logging;

pub use error::{CropCareError, Result};
pub use logging::{init_logging, LogConfig, LogLevel, ProgressLogger, TrainingLogger};

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours as u32, minutes as u32)
    }
}

/// Format a fraction in [0, 1] as a bar, used by the CLI class summary
pub fn format_bar(fraction: f64, width: usize) -> String {
    let filled = (fraction.clamp(0.0, 1.0) * width as f64).round() as usize;
    "█".repeat(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.5), "30.5s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m");
    }

    #[test]
    fn test_format_bar() {
        assert_eq!(format_bar(0.5, 10).chars().count(), 5);
        assert_eq!(format_bar(2.0, 4).chars().count(), 4);
        assert!(format_bar(0.0, 10).is_empty());
    }
}
