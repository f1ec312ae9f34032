// error.rs — error taxonomy for the detection pipeline.
//
// Three fatal categories, no retries anywhere: the pipeline assumes a
// correctly provisioned device and valid inputs, and a failure in any
// stage aborts the run. Configuration errors surface before any device
// work begins.

use std::fmt;

/// Errors produced by the circle detection pipeline.
#[derive(Debug)]
pub enum HoughError {
    /// Invalid or out-of-range parameters: empty radius range, zero step,
    /// a sensitivity outside (0, 1], a memory ceiling too small to hold a
    /// single accumulator plane, or an adapter index past the end of the
    /// enumerated list.
    Configuration(String),
    /// Kernel compile/build failure, argument binding failure, or launch
    /// failure. The build log (if the backend produced one) is carried
    /// verbatim in the message.
    DeviceExecution(String),
    /// Input image load failure (missing, unreadable, or empty file).
    Resource(String),
}

impl fmt::Display for HoughError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoughError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            HoughError::DeviceExecution(msg) => write!(f, "device execution error: {msg}"),
            HoughError::Resource(msg) => write!(f, "resource error: {msg}"),
        }
    }
}

impl std::error::Error for HoughError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_category_and_message() {
        let e = HoughError::Configuration("radius range is empty".into());
        let s = e.to_string();
        assert!(s.contains("configuration"));
        assert!(s.contains("radius range is empty"));

        let e = HoughError::DeviceExecution("naga: unknown identifier".into());
        assert!(e.to_string().contains("naga: unknown identifier"));
    }
}
