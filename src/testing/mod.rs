//! Assertion-based API testing.
//!
//! [`assertion`] evaluates single assertions against a response,
//! [`runner::TestRunner`] executes test cases and whole suites, and
//! [`report`] summarizes their results.

pub mod assertion;
pub mod report;
pub mod runner;

pub use assertion::{
    Assertion, AssertionError, AssertionKind, AssertionOutcome, AssertionResult, evaluate,
    run_assertions,
};
pub use report::{Report, Summary, generate_report};
pub use runner::{
    MAX_RESULTS, RunOptions, RunnerError, RunningTest, TestCase, TestResult, TestRunner, TestStatus,
};
