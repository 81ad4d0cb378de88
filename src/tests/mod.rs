//! Scenario tests that drive the whole controller through an in-memory transport.
