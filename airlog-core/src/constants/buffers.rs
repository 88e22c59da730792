//! Buffer Sizes
//!
//! Capacities for the reducer windows and serial frame assembly.

/// Default number of samples per tumbling window.
///
/// With one event every two seconds this is one record per minute.
pub const DEFAULT_WINDOW_SIZE: usize = 30;

/// Largest supported window.
///
/// Each field keeps a `heapless::Deque<f64, MAX_WINDOW_SIZE>`:
/// 256 × 8 bytes = 2KB per field.
pub const MAX_WINDOW_SIZE: usize = 256;

/// Upper bound on a single serial frame when the model gives none (bytes).
pub const MAX_FRAME_LEN: usize = 4096;
