//! Test suites for the runtime bootstrap and socket transport.

mod support;
mod unit;
