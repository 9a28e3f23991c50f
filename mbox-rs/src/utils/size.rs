use serde::Serialize;
use std::fmt;

const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

/// A byte count scaled to the largest unit that keeps it above 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReadableSize {
    pub bytes: u64,
    /// Rounded to two decimals
    pub size: f64,
    pub unit: &'static str,
}

impl fmt::Display for ReadableSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.size, self.unit)
    }
}

pub fn readable_size(bytes: u64) -> ReadableSize {
    let mut size = bytes as f64;
    let mut unit = "B";

    for next in UNITS {
        if size / 1024.0 > 1.0 {
            size /= 1024.0;
            unit = next;
        } else {
            break;
        }
    }

    ReadableSize {
        bytes,
        size: (size * 100.0).round() / 100.0,
        unit,
    }
}
