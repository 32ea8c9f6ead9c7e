//! End-to-end tests that drive the full application.
