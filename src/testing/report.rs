use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::runner::{TestResult, TestStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub summary: Summary,
    pub results: Vec<TestResult>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Percent, rounded to one decimal. Zero for an empty run.
    pub success_rate: f64,
    /// Milliseconds, rounded.
    pub avg_response_time: u64,
}

impl Summary {
    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.passed == self.total
    }
}

pub fn generate_report(results: &[TestResult]) -> Report {
    let total = results.len();
    let passed = count(results, TestStatus::Passed);
    let failed = count(results, TestStatus::Failed);

    let (success_rate, avg_response_time) = if total == 0 {
        (0.0, 0)
    } else {
        let rate = passed as f64 / total as f64 * 100.0;
        let time_sum: u64 = results.iter().map(|result| result.response_time).sum();
        (
            (rate * 10.0).round() / 10.0,
            (time_sum as f64 / total as f64).round() as u64,
        )
    };

    Report {
        summary: Summary {
            total,
            passed,
            failed,
            success_rate,
            avg_response_time,
        },
        results: results.to_vec(),
        timestamp: Utc::now(),
    }
}

fn count(results: &[TestResult], status: TestStatus) -> usize {
    results.iter().filter(|result| result.status == status).count()
}

impl Report {
    /// Plain-text rendering used by the command line.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            let marker = match result.status {
                TestStatus::Passed => "PASS",
                TestStatus::Failed => "FAIL",
                TestStatus::Pending | TestStatus::Running => "....",
            };
            out.push_str(&format!(
                "{marker} {} ({} ms, status {})\n",
                result.test_id, result.response_time, result.status_code
            ));
            if let Some(error) = &result.error {
                out.push_str(&format!("     error: {error}\n"));
            }
            for assertion in result.assertions.iter().filter(|a| !a.passed) {
                out.push_str(&format!("     {}: {}\n", assertion.kind, assertion.message));
            }
        }
        let summary = &self.summary;
        out.push_str(&format!(
            "\n{}/{} passed ({}%), {} failed, avg {} ms\n",
            summary.passed,
            summary.total,
            summary.success_rate,
            summary.failed,
            summary.avg_response_time
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn result(test_id: &str, status: TestStatus, response_time: u64) -> TestResult {
        TestResult {
            id: format!("r-{test_id}"),
            test_id: test_id.into(),
            suite_id: "s".into(),
            status,
            response_time,
            status_code: 200,
            headers: BTreeMap::new(),
            response: None,
            assertions: Vec::new(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn summary_aggregates_results() {
        let results = vec![
            result("a", TestStatus::Passed, 10),
            result("b", TestStatus::Failed, 21),
            result("c", TestStatus::Passed, 30),
        ];

        let report = generate_report(&results);
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.passed, 2);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.success_rate, 66.7);
        assert_eq!(report.summary.avg_response_time, 20);
        assert!(!report.summary.all_passed());
        assert_eq!(report.results, results);
    }

    #[test]
    fn empty_report_is_zeroed() {
        let report = generate_report(&[]);
        assert_eq!(report.summary.total, 0);
        assert_eq!(report.summary.success_rate, 0.0);
        assert!(!report.summary.all_passed());
    }

    #[test]
    fn text_lists_failures() {
        let mut failed = result("b", TestStatus::Failed, 0);
        failed.error = Some("Service not found: ghost".into());
        let report = generate_report(&[result("a", TestStatus::Passed, 4), failed]);

        let text = report.to_text();
        assert!(text.contains("PASS a (4 ms, status 200)"));
        assert!(text.contains("error: Service not found: ghost"));
        assert!(text.contains("1/2 passed (50%)"));
    }

    #[test]
    fn serializes_camel_case_summary() {
        let report = generate_report(&[result("a", TestStatus::Passed, 4)]);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["summary"]["successRate"], 100.0);
        assert_eq!(value["summary"]["avgResponseTime"], 4);
        assert_eq!(value["results"][0]["status"], "passed");
    }
}
