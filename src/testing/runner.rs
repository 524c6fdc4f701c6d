use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::auth::Auth;
use crate::environment::interpolate_request;
use crate::http::client::HttpClient;
use crate::http::method::HttpMethod;
use crate::http::request::{Headers, Params, RequestBody, RequestConfig, merge_headers};
use crate::services::{ServiceError, ServiceRegistry, build_endpoint_url};

use super::assertion::{Assertion, AssertionResult, run_assertions};
use super::report::{Report, generate_report};

/// Results kept in the runner's log; older ones are dropped first.
pub const MAX_RESULTS: usize = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunnerError {
    #[error("Test not found: {0}")]
    TestNotFound(String),
    #[error("Test is already running: {0}")]
    AlreadyRunning(String),
    #[error("No tests found in suite: {0}")]
    EmptySuite(String),
}

/// One API test: a request against a registered service plus the
/// assertions its response must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub suite_id: String,
    #[serde(default)]
    pub name: String,
    pub service_id: String,
    pub endpoint: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: RequestBody,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub auth: Option<Auth>,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TestStatus {
    #[default]
    Pending,
    Running,
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: String,
    pub test_id: String,
    pub suite_id: String,
    pub status: TestStatus,
    pub response_time: u64,
    pub status_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub assertions: Vec<AssertionResult>,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TestResult {
    fn failed(test: &TestCase, error: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            test_id: test.id.clone(),
            suite_id: test.suite_id.clone(),
            status: TestStatus::Failed,
            response_time: 0,
            status_code: 0,
            headers: BTreeMap::new(),
            response: None,
            assertions: Vec::new(),
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub parallel: bool,
    /// Overrides every test's and service's timeout, in milliseconds.
    pub timeout: Option<u64>,
}

/// A test currently in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningTest {
    pub test_id: String,
    pub started_at: DateTime<Utc>,
}

/// Runs test cases against the registered services and keeps a log of
/// every result produced.
pub struct TestRunner {
    client: Arc<HttpClient>,
    registry: ServiceRegistry,
    tests: Vec<TestCase>,
    running: Arc<AtomicBool>,
    running_tests: Mutex<HashMap<String, DateTime<Utc>>>,
    results: Mutex<Vec<TestResult>>,
}

impl TestRunner {
    pub fn new(client: Arc<HttpClient>, registry: ServiceRegistry) -> Self {
        Self {
            client,
            registry,
            tests: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            running_tests: Mutex::new(HashMap::new()),
            results: Mutex::new(Vec::new()),
        }
    }

    pub fn with_tests(mut self, tests: impl IntoIterator<Item = TestCase>) -> Self {
        self.tests.extend(tests);
        self
    }

    pub fn client(&self) -> &Arc<HttpClient> {
        &self.client
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ServiceRegistry {
        &mut self.registry
    }

    pub fn tests(&self) -> &[TestCase] {
        &self.tests
    }

    pub fn add_test(&mut self, test: TestCase) {
        self.tests.retain(|existing| existing.id != test.id);
        self.tests.push(test);
    }

    pub fn get_test(&self, id: &str) -> Option<&TestCase> {
        self.tests.iter().find(|test| test.id == id)
    }

    /// Set while a suite is executing.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// The latest [`MAX_RESULTS`] results produced by this runner, oldest
    /// first.
    pub fn results(&self) -> Vec<TestResult> {
        self.lock_results().clone()
    }

    pub fn restore_results(&self, mut results: Vec<TestResult>) {
        let excess = results.len().saturating_sub(MAX_RESULTS);
        results.drain(..excess);
        *self.lock_results() = results;
    }

    pub fn running_tests(&self) -> Vec<RunningTest> {
        let mut running: Vec<RunningTest> = self
            .lock_running()
            .iter()
            .map(|(test_id, started_at)| RunningTest {
                test_id: test_id.clone(),
                started_at: *started_at,
            })
            .collect();
        running.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        running
    }

    pub fn is_test_running(&self, id: &str) -> bool {
        self.lock_running().contains_key(id)
    }

    /// Forgets that `id` is running. The request itself is not interrupted.
    pub fn stop_test(&self, id: &str) -> bool {
        self.lock_running().remove(id).is_some()
    }

    pub fn stop_all_tests(&self) {
        self.lock_running().clear();
        self.running.store(false, Ordering::SeqCst);
    }

    /// Runs a single test. Failures are reported in the result, never as an
    /// error.
    pub async fn run_test(&self, test: &TestCase, options: RunOptions) -> TestResult {
        let config = match self.request_config(test, options) {
            Ok(config) => config,
            Err(err) => return TestResult::failed(test, err.to_string()),
        };

        let started = Instant::now();
        let response = match self.client.request(config).await {
            Ok(response) => response,
            Err(err) => return TestResult::failed(test, err.to_string()),
        };
        let response_time = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let assertions = run_assertions(&test.assertions, &response);
        let status = if assertions.iter().all(|a| a.passed) {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        };

        TestResult {
            id: Uuid::new_v4().to_string(),
            test_id: test.id.clone(),
            suite_id: test.suite_id.clone(),
            status,
            response_time,
            status_code: response.status,
            headers: response.headers,
            response: Some(response.data.to_value()),
            assertions,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Runs a registered test, tracking it as running and logging its
    /// result.
    pub async fn run_test_by_id(
        &self,
        id: &str,
        options: RunOptions,
    ) -> Result<TestResult, RunnerError> {
        let test = self
            .get_test(id)
            .ok_or_else(|| RunnerError::TestNotFound(id.to_string()))?;

        {
            let mut running = self.lock_running();
            if running.contains_key(id) {
                return Err(RunnerError::AlreadyRunning(id.to_string()));
            }
            running.insert(id.to_string(), Utc::now());
        }

        let result = self.run_test(test, options).await;
        tracing::info!(
            test = %test.id,
            status = %result.status,
            response_time = result.response_time,
            "test finished"
        );

        self.record(result.clone());
        self.lock_running().remove(id);
        Ok(result)
    }

    /// Runs every test of `suite_id` and returns their results in
    /// declaration order.
    pub async fn run_test_suite(
        &self,
        suite_id: &str,
        options: RunOptions,
    ) -> Result<Vec<TestResult>, RunnerError> {
        let suite: Vec<&TestCase> = self
            .tests
            .iter()
            .filter(|test| test.suite_id == suite_id)
            .collect();
        if suite.is_empty() {
            return Err(RunnerError::EmptySuite(suite_id.to_string()));
        }

        tracing::info!(suite = %suite_id, tests = suite.len(), parallel = options.parallel, "running suite");
        self.running.store(true, Ordering::SeqCst);

        let results = if options.parallel {
            join_all(suite.iter().map(|test| self.run_suite_member(test, options))).await
        } else {
            let mut results = Vec::with_capacity(suite.len());
            for test in &suite {
                results.push(self.run_suite_member(test, options).await);
            }
            results
        };

        self.running.store(false, Ordering::SeqCst);
        let passed = results.iter().filter(|result| result.passed()).count();
        tracing::info!(suite = %suite_id, passed, total = results.len(), "suite completed");

        Ok(results)
    }

    pub fn generate_report(&self, results: &[TestResult]) -> Report {
        generate_report(results)
    }

    async fn run_suite_member(&self, test: &TestCase, options: RunOptions) -> TestResult {
        match self.run_test_by_id(&test.id, options).await {
            Ok(result) => result,
            Err(err) => {
                let result = TestResult::failed(test, err.to_string());
                self.record(result.clone());
                result
            }
        }
    }

    fn request_config(
        &self,
        test: &TestCase,
        options: RunOptions,
    ) -> Result<RequestConfig, ServiceError> {
        let service = self
            .registry
            .get(&test.service_id)
            .ok_or_else(|| ServiceError::NotFound(test.service_id.clone()))?;
        let service_config = self.registry.service_config(service);

        let mut headers = service_config.headers;
        merge_headers(&mut headers, &test.headers);

        let mut config = RequestConfig {
            url: build_endpoint_url(&service_config.base_url, &test.endpoint),
            method: test.method,
            headers,
            body: test.body.clone(),
            params: test.params.clone(),
            auth: test.auth.clone().or(service_config.auth),
            timeout: Some(
                options
                    .timeout
                    .or(test.timeout)
                    .unwrap_or(service_config.timeout),
            ),
            ..Default::default()
        };
        interpolate_request(&mut config, &self.registry.variables());

        Ok(config)
    }

    fn lock_running(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.running_tests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, result: TestResult) {
        let mut results = self.lock_results();
        results.push(result);
        let excess = results.len().saturating_sub(MAX_RESULTS);
        results.drain(..excess);
    }

    fn lock_results(&self) -> MutexGuard<'_, Vec<TestResult>> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
