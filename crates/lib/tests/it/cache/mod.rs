//! Profile cache persistence tests
