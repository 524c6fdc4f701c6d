//! HTTP request engine and assertion-based API test runner.
//!
//! [`http::HttpClient`] executes requests through interceptor chains with
//! authentication, timeouts, retries and a bounded history.
//! [`testing::TestRunner`] runs declarative test cases against the services
//! of a [`services::ServiceRegistry`] and evaluates their assertions.

pub mod auth;
pub mod cli;
pub mod config;
pub mod environment;
pub mod history;
pub mod http;
pub mod services;
pub mod storage;
pub mod testing;
