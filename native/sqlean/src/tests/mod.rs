//! Unit and integration tests for sqlean
//!
//! This module organizes all tests into logical submodules that correspond to
//! the main library modules.

mod adaptation_tests;
mod blob_tests;
mod test_utils;
