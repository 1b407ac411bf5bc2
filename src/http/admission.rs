//! Per-path admission control.
//!
//! A fixed one-second window counter per protected path prefix. Excess
//! requests are either rejected immediately or delayed once and re-tried,
//! depending on the configured overload policy. Requests on unprotected
//! paths pass through untouched.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use super::state::GatewayState;

/// Business path prefixes guarded by the admission filter. One shared rule
/// covers all of them in the default configuration; distinct rules per
/// prefix are supported through [`AdmissionController::with_rules`].
pub const PROTECTED_PREFIXES: &[&str] = &[
    "/consent",
    "/kv",
    "/oauth",
    "/report",
    "/sp",
    "/retailers",
    "/brands",
    "/sps",
    "/recipients",
    "/integrator",
    "/public",
    "/government",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverloadPolicy {
    /// Reject excess requests immediately
    Reject,
    /// Delay excess requests once, then retry admission
    Delay(Duration),
}

#[derive(Debug, Clone)]
pub struct AdmissionRule {
    pub max_requests_per_sec: u32,
    /// Maximum wall time a request may spend in the handler chain
    pub max_request_ms: u64,
    pub overload: OverloadPolicy,
}

#[derive(Debug)]
struct Window {
    epoch_sec: u64,
    count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Pass,
    Reject,
    Delay(Duration),
}

pub struct AdmissionController {
    // Longest prefix first so /sps never matches the /sp rule
    rules: Vec<(String, AdmissionRule)>,
    windows: DashMap<String, Window>,
}

impl AdmissionController {
    /// One rule attached to every protected prefix.
    pub fn new(rule: AdmissionRule) -> Self {
        Self::with_rules(
            PROTECTED_PREFIXES
                .iter()
                .map(|p| (p.to_string(), rule.clone()))
                .collect(),
        )
    }

    pub fn with_rules(mut rules: Vec<(String, AdmissionRule)>) -> Self {
        rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self {
            rules,
            windows: DashMap::new(),
        }
    }

    fn match_rule(&self, path: &str) -> Option<(&str, &AdmissionRule)> {
        self.rules
            .iter()
            .find(|(prefix, _)| {
                path == prefix.as_str()
                    || (path.starts_with(prefix.as_str())
                        && path.as_bytes().get(prefix.len()) == Some(&b'/'))
            })
            .map(|(prefix, rule)| (prefix.as_str(), rule))
    }

    pub fn max_request_ms(&self, path: &str) -> Option<u64> {
        self.match_rule(path).map(|(_, rule)| rule.max_request_ms)
    }

    pub fn check(&self, path: &str) -> Decision {
        self.check_at(path, now_epoch_sec())
    }

    /// Admission decision for a request arriving at `now_sec`. Split out
    /// from [`check`] so window accounting is testable with a fixed clock.
    pub fn check_at(&self, path: &str, now_sec: u64) -> Decision {
        let Some((prefix, rule)) = self.match_rule(path) else {
            return Decision::Pass;
        };

        if self.try_acquire(prefix, rule, now_sec) {
            Decision::Pass
        } else {
            match rule.overload {
                OverloadPolicy::Reject => Decision::Reject,
                OverloadPolicy::Delay(d) => Decision::Delay(d),
            }
        }
    }

    /// Second admission attempt after a delay.
    pub fn retry(&self, path: &str) -> bool {
        let now = now_epoch_sec();
        match self.match_rule(path) {
            Some((prefix, rule)) => self.try_acquire(prefix, rule, now),
            None => true,
        }
    }

    fn try_acquire(&self, prefix: &str, rule: &AdmissionRule, now_sec: u64) -> bool {
        let mut window = self.windows.entry(prefix.to_string()).or_insert(Window {
            epoch_sec: now_sec,
            count: 0,
        });
        if window.epoch_sec != now_sec {
            window.epoch_sec = now_sec;
            window.count = 0;
        }
        if window.count < rule.max_requests_per_sec {
            window.count += 1;
            true
        } else {
            false
        }
    }
}

fn now_epoch_sec() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Rate-limit filter installed in front of every business route.
pub async fn admission_middleware(
    State(state): State<GatewayState>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();

    match state.admission.check(&path) {
        Decision::Pass => run_with_deadline(&state, &path, req, next).await,
        Decision::Reject => {
            // Caller-visible rejection, not a server-side failure
            debug!(path = %path, "request rejected by rate limit");
            (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response()
        }
        Decision::Delay(delay) => {
            tokio::time::sleep(delay).await;
            if state.admission.retry(&path) {
                run_with_deadline(&state, &path, req, next).await
            } else {
                debug!(path = %path, "request rejected after delay");
                (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response()
            }
        }
    }
}

async fn run_with_deadline(state: &GatewayState, path: &str, req: Request, next: Next) -> Response {
    let Some(max_ms) = state.admission.max_request_ms(path) else {
        return next.run(req).await;
    };
    match tokio::time::timeout(Duration::from_millis(max_ms), next.run(req)).await {
        Ok(response) => response,
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "request exceeded maximum duration",
        )
            .into_response(),
    }
}

/// Outermost gate: only a Running daemon admits business requests.
pub async fn lifecycle_gate(
    State(state): State<GatewayState>,
    req: Request,
    next: Next,
) -> Response {
    let current = *state.lifecycle.borrow();
    if !current.accepts_requests() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "service is not accepting requests",
        )
            .into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reject_rule(max: u32) -> AdmissionRule {
        AdmissionRule {
            max_requests_per_sec: max,
            max_request_ms: 60_000,
            overload: OverloadPolicy::Reject,
        }
    }

    #[test]
    fn test_threshold_within_one_window() {
        let controller = AdmissionController::new(reject_rule(5));

        let mut passed = 0;
        let mut rejected = 0;
        for _ in 0..8 {
            match controller.check_at("/consent/search", 1_000) {
                Decision::Pass => passed += 1,
                Decision::Reject => rejected += 1,
                Decision::Delay(_) => panic!("unexpected delay"),
            }
        }
        assert_eq!(passed, 5);
        assert_eq!(rejected, 3);
    }

    #[test]
    fn test_window_resets_each_second() {
        let controller = AdmissionController::new(reject_rule(2));

        assert_eq!(controller.check_at("/brands/search", 10), Decision::Pass);
        assert_eq!(controller.check_at("/brands/search", 10), Decision::Pass);
        assert_eq!(controller.check_at("/brands/search", 10), Decision::Reject);
        assert_eq!(controller.check_at("/brands/search", 11), Decision::Pass);
    }

    #[test]
    fn test_prefixes_are_counted_separately() {
        let controller = AdmissionController::new(reject_rule(1));

        assert_eq!(controller.check_at("/consent/search", 5), Decision::Pass);
        assert_eq!(controller.check_at("/brands/search", 5), Decision::Pass);
        assert_eq!(controller.check_at("/consent/other", 5), Decision::Reject);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let controller = AdmissionController::with_rules(vec![
            ("/sp".to_string(), reject_rule(1)),
            ("/sps".to_string(), reject_rule(10)),
        ]);

        // /sps traffic must not consume the /sp budget
        assert_eq!(controller.check_at("/sp/info", 7), Decision::Pass);
        assert_eq!(controller.check_at("/sps/list", 7), Decision::Pass);
        assert_eq!(controller.check_at("/sps/list", 7), Decision::Pass);
        assert_eq!(controller.check_at("/sp/info", 7), Decision::Reject);
    }

    #[test]
    fn test_unprotected_paths_pass() {
        let controller = AdmissionController::new(reject_rule(0));
        assert_eq!(controller.check_at("/healthz", 3), Decision::Pass);
        // Prefix match requires a segment boundary
        assert_eq!(controller.check_at("/consenting", 3), Decision::Pass);
    }

    #[test]
    fn test_delay_policy_reports_configured_delay() {
        let rule = AdmissionRule {
            max_requests_per_sec: 1,
            max_request_ms: 60_000,
            overload: OverloadPolicy::Delay(Duration::from_millis(250)),
        };
        let controller = AdmissionController::new(rule);

        assert_eq!(controller.check_at("/kv/a", 42), Decision::Pass);
        assert_eq!(
            controller.check_at("/kv/a", 42),
            Decision::Delay(Duration::from_millis(250))
        );
    }
}
