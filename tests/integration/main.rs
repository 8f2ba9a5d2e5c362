//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one area of the command
//! façade against the recording mock stack.  Everything runs on the host.

mod connection_tests;
mod mock_stack;
