//! Shared constants for end-to-end tests
//!
//! This module contains all constants used across the test suite.
//! When the mock upstream data changes, update only this file.

// ============================================================================
// Mock Upstream Data
// ============================================================================

/// First numeric id handed out by the mock search endpoint
pub const FIRST_SEARCH_TRACK_ID: u64 = 1000;

/// Track id the mock Deezer API reports as unknown
pub const UNKNOWN_TRACK_ID: &str = "404404";

/// Mood returned by the mock classifier for any image
pub const CLASSIFIED_MOOD: &str = "sad";

/// Confidence returned by the mock classifier
pub const CLASSIFIED_CONFIDENCE: f64 = 0.9;

/// Image payload the mock classifier treats as "no face found"
pub const NO_FACE_IMAGE: &[u8] = b"no face here";

/// Size of every preview clip served by the mock upstream (bytes)
pub const PREVIEW_SIZE_BYTES: usize = 4096;

/// Artificial latency of a preview download, so concurrent requests overlap (milliseconds)
pub const PREVIEW_DELAY_MS: u64 = 200;

// ============================================================================
// Test Timeouts and Configuration
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Content cache age configured on the test server (seconds)
pub const TEST_CONTENT_CACHE_AGE_SEC: usize = 60;
