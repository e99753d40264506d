use std::time::Duration;

use promote_core::PromoteError;
use promote_delivery::fakes::FakeHost;
use promote_delivery::{poll_checks, CheckRun, PollPolicy, RemoteError};

const BRANCH: &str = "promote/acme-deploy/main/env-dev/1-1-abcdef0";
const PR: &str = "https://github.com/acme/deploy/pull/1";

fn policy(attempts: u32) -> PollPolicy {
    PollPolicy::new(attempts, Duration::from_secs(30)).unwrap()
}

fn runs(buckets: &[(&str, &str)]) -> Result<Vec<CheckRun>, RemoteError> {
    Ok(buckets
        .iter()
        .map(|(name, bucket)| CheckRun::new(name, bucket))
        .collect())
}

fn read_failure() -> Result<Vec<CheckRun>, RemoteError> {
    Err(RemoteError::CommandFailed {
        command: "gh pr checks".to_string(),
        status: "exit code 1".to_string(),
        stderr: "HTTP 502".to_string(),
    })
}

#[tokio::test(start_paused = true)]
async fn unreported_then_pending_then_passed() {
    let host = FakeHost::new();
    host.script_checks(vec![
        runs(&[]),
        runs(&[("build", "pending")]),
        runs(&[("build", "pass"), ("lint", "skipping")]),
    ]);

    let start = tokio::time::Instant::now();
    let final_runs = poll_checks(&host, BRANCH, PR, &policy(10)).await.unwrap();

    assert_eq!(final_runs.len(), 2);
    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(60) && waited < Duration::from_secs(90), "{waited:?}");
}

#[tokio::test(start_paused = true)]
async fn budget_exhaustion_is_a_timeout() {
    let host = FakeHost::new();
    host.script_checks(vec![
        runs(&[("build", "pending")]),
        runs(&[("build", "pending")]),
        runs(&[("build", "pending")]),
    ]);

    let start = tokio::time::Instant::now();
    let err = poll_checks(&host, BRANCH, PR, &policy(3)).await.unwrap_err();

    match err {
        PromoteError::PollTimeout { attempts, last, .. } => {
            assert_eq!(attempts, 3);
            assert_eq!(last, "pending");
        }
        other => panic!("unexpected error: {other}"),
    }
    // No sleep after the final attempt.
    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(60) && waited < Duration::from_secs(90), "{waited:?}");
}

#[tokio::test(start_paused = true)]
async fn never_reported_checks_time_out_not_fail() {
    let host = FakeHost::new();
    host.script_checks(vec![runs(&[]), runs(&[])]);

    let err = poll_checks(&host, BRANCH, PR, &policy(2)).await.unwrap_err();
    assert!(matches!(err, PromoteError::PollTimeout { ref last, .. } if last == "unreported"));
    assert_eq!(err.exit_code(), 8);
}

#[tokio::test(start_paused = true)]
async fn failed_reads_use_attempts_and_are_retried() {
    let host = FakeHost::new();
    host.script_checks(vec![read_failure(), read_failure(), runs(&[("build", "pass")])]);

    poll_checks(&host, BRANCH, PR, &policy(3)).await.unwrap();
    assert_eq!(host.calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn failed_reads_alone_exhaust_the_budget() {
    let host = FakeHost::new();
    host.script_checks(vec![read_failure(), read_failure()]);

    let err = poll_checks(&host, BRANCH, PR, &policy(2)).await.unwrap_err();
    assert!(matches!(err, PromoteError::PollTimeout { ref last, .. } if last.starts_with("unreadable")));
}

#[tokio::test(start_paused = true)]
async fn failure_stops_polling_immediately() {
    let host = FakeHost::new();
    host.script_checks(vec![
        runs(&[("build", "pending")]),
        runs(&[("build", "fail"), ("deploy", "cancel")]),
        runs(&[("build", "pass")]),
    ]);

    let err = poll_checks(&host, BRANCH, PR, &policy(10)).await.unwrap_err();

    match err {
        PromoteError::ChecksFailed { failing, pull_request } => {
            assert_eq!(failing, vec!["build", "deploy"]);
            assert_eq!(pull_request, PR);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(host.calls().len(), 2);
}
