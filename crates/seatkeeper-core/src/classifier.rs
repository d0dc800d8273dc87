use crate::upstream::UpstreamError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;

/// Longest upstream text shown to a user under [`ErrorKind::Unknown`].
pub const MAX_DETAIL_CHARS: usize = 120;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Closed failure taxonomy shared by user messaging and retry decisions.
///
/// The first seven variants come from classifying upstream failures; the rest
/// are raised locally and never involve a network round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    BindingRequired,
    RateLimitedOrBanned,
    SeatConflict,
    PreselectFailed,
    CancelFailed,
    Unknown,
    VenueClosed,
    SeatUnavailable,
    AlreadyInFlight,
    NoActiveReservation,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::BindingRequired => "binding_required",
            ErrorKind::RateLimitedOrBanned => "rate_limited_or_banned",
            ErrorKind::SeatConflict => "seat_conflict",
            ErrorKind::PreselectFailed => "preselect_failed",
            ErrorKind::CancelFailed => "cancel_failed",
            ErrorKind::Unknown => "unknown",
            ErrorKind::VenueClosed => "venue_closed",
            ErrorKind::SeatUnavailable => "seat_unavailable",
            ErrorKind::AlreadyInFlight => "already_in_flight",
            ErrorKind::NoActiveReservation => "no_active_reservation",
        }
    }

    /// True for conditions detected before any upstream call.
    pub fn is_local(self) -> bool {
        matches!(
            self,
            ErrorKind::VenueClosed
                | ErrorKind::SeatUnavailable
                | ErrorKind::AlreadyInFlight
                | ErrorKind::NoActiveReservation
        )
    }

    /// True when the failure concerns the whole account rather than one seat.
    /// Fallback iteration stops on these.
    pub fn is_account_level(self) -> bool {
        matches!(
            self,
            ErrorKind::Unauthorized | ErrorKind::BindingRequired | ErrorKind::RateLimitedOrBanned
        )
    }

    /// Fixed user-facing message. `Unknown` callers append the bounded detail.
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "session expired or invalid; re-authenticate",
            ErrorKind::BindingRequired => "account must be bound to a student id first",
            ErrorKind::RateLimitedOrBanned => {
                "reservations temporarily restricted for this account"
            }
            ErrorKind::SeatConflict => "seat was not confirmed; it was likely taken",
            ErrorKind::PreselectFailed => "seat pre-selection failed",
            ErrorKind::CancelFailed => "cancellation failed",
            ErrorKind::Unknown => "upstream error",
            ErrorKind::VenueClosed => "venue is closed at this time",
            ErrorKind::SeatUnavailable => "seat is not available",
            ErrorKind::AlreadyInFlight => "another booking action is already in progress",
            ErrorKind::NoActiveReservation => "no active reservation to sign in to",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// Everything recoverable from one upstream failure payload.
///
/// The backend reports errors as a plain string, as `{"detail": ...}`, as
/// `{"errors": [{"code": ..}]}`, or with `detail` holding a stringified list or
/// dict (sometimes Python repr). All shapes are flattened here.
#[derive(Debug, Clone, Default)]
pub struct Evidence {
    pub status: u16,
    /// Lowercased concatenation of every text fragment found.
    haystack: String,
    /// Message fragments in discovery order, most specific last.
    messages: Vec<String>,
    pub codes: Vec<i64>,
}

const MAX_DEPTH: usize = 8;

impl Evidence {
    pub fn gather(status: u16, raw: &str) -> Self {
        let mut ev = Evidence {
            status,
            ..Default::default()
        };
        ev.push_text(raw);
        ev.scan_str(raw, 0);
        ev
    }

    pub fn contains_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.haystack.contains(n))
    }

    pub fn has_code(&self, code: i64) -> bool {
        self.codes.contains(&code)
    }

    /// The most specific human-readable fragment.
    pub fn summary(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| !m.trim().is_empty())
            .map(|m| m.as_str())
            .unwrap_or("")
    }

    fn push_text(&mut self, s: &str) {
        self.haystack.push_str(&s.to_lowercase());
        self.haystack.push('\n');
        self.messages.push(s.trim().to_string());
    }

    fn scan_str(&mut self, s: &str, depth: usize) {
        if depth > MAX_DEPTH {
            return;
        }
        let t = s.trim();
        if !(t.starts_with('{') || t.starts_with('[')) {
            return;
        }
        if let Some(v) = parse_loose(t) {
            self.scan_value(&v, depth + 1);
        } else {
            for c in code_regex().captures_iter(t) {
                if let Ok(code) = c[1].parse::<i64>() {
                    self.codes.push(code);
                }
            }
        }
    }

    fn scan_value(&mut self, v: &Value, depth: usize) {
        if depth > MAX_DEPTH {
            return;
        }
        match v {
            Value::String(s) => {
                self.push_text(s);
                self.scan_str(s, depth + 1);
            }
            Value::Array(items) => {
                for item in items {
                    self.scan_value(item, depth + 1);
                }
            }
            Value::Object(map) => {
                if let Some(code) = map.get("code").and_then(code_of) {
                    self.codes.push(code);
                }
                for key in ["detail", "msg", "message", "errors", "error"] {
                    if let Some(inner) = map.get(key) {
                        self.scan_value(inner, depth + 1);
                    }
                }
            }
            _ => {}
        }
    }
}

fn code_of(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

static CODE_RE: OnceLock<Regex> = OnceLock::new();

fn code_regex() -> &'static Regex {
    CODE_RE.get_or_init(|| Regex::new(r#"["']code["']\s*:\s*["']?(-?\d+)"#).unwrap())
}

/// Parse JSON, falling back to a Python-repr rewrite (`'` → `"`, `True`, `None`).
fn parse_loose(s: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(s) {
        return Some(v);
    }
    let rewritten = s
        .replace('\'', "\"")
        .replace("True", "true")
        .replace("False", "false")
        .replace("None", "null");
    serde_json::from_str::<Value>(&rewritten).ok()
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// A fn-pointer rule; the first rule whose condition holds wins.
pub struct Rule {
    pub id: &'static str,
    pub condition: fn(&Evidence) -> bool,
    pub kind: ErrorKind,
}

const BINDING_MARKERS: &[&str] = &[
    "unable to resolve student id",
    "bind student id",
    "bind your student id",
    "绑定学号",
    "无法解析学号",
];

const RESTRICTION_MARKERS: &[&str] = &[
    "temporarily restricted",
    "abnormal reservation",
    "restricted",
    "限制预约",
    "异常预约",
    "被临时限制",
];

const PRESELECT_MARKERS: &[&str] = &["prereserve", "pre-reserve", "preselect", "预选"];

const CANCEL_MARKERS: &[&str] = &["cancel failed", "cancellation failed", "取消失败"];

const CONFLICT_MARKERS: &[&str] = &[
    "系统未确认座位",
    "not confirmed",
    "reserve failed",
    "seat taken",
    "已被占用",
    "已被预约",
];

pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: "http-401",
            condition: |ev| ev.status == 401,
            kind: ErrorKind::Unauthorized,
        },
        Rule {
            id: "student-id-binding",
            condition: |ev| ev.contains_any(BINDING_MARKERS) || ev.has_code(40005),
            kind: ErrorKind::BindingRequired,
        },
        Rule {
            id: "restricted-account",
            condition: |ev| {
                ev.contains_any(RESTRICTION_MARKERS)
                    || ev.has_code(40001)
                    || (matches!(ev.status, 403 | 500) && ev.has_code(1))
            },
            kind: ErrorKind::RateLimitedOrBanned,
        },
        Rule {
            id: "preselect",
            condition: |ev| ev.contains_any(PRESELECT_MARKERS),
            kind: ErrorKind::PreselectFailed,
        },
        Rule {
            id: "cancel",
            condition: |ev| ev.contains_any(CANCEL_MARKERS),
            kind: ErrorKind::CancelFailed,
        },
        Rule {
            id: "seat-not-confirmed",
            condition: |ev| ev.contains_any(CONFLICT_MARKERS),
            kind: ErrorKind::SeatConflict,
        },
    ]
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Result of classifying one upstream failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub rule: Option<&'static str>,
    /// User-safe message: fixed text, or bounded raw detail for `Unknown`.
    pub message: String,
}

pub struct Classifier {
    rules: Vec<Rule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl Classifier {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn classify(&self, status: u16, raw_detail: &str) -> Classification {
        let ev = Evidence::gather(status, raw_detail);
        for rule in &self.rules {
            if (rule.condition)(&ev) {
                return Classification {
                    kind: rule.kind,
                    rule: Some(rule.id),
                    message: rule.kind.message().to_string(),
                };
            }
        }

        // Fallback: unknown, pass a bounded slice of the detail through
        let detail = truncate(ev.summary(), MAX_DETAIL_CHARS);
        let message = match (status, detail.is_empty()) {
            (0, true) => ErrorKind::Unknown.message().to_string(),
            (0, false) => format!("{}: {detail}", ErrorKind::Unknown.message()),
            (s, true) => format!("{} (HTTP {s})", ErrorKind::Unknown.message()),
            (s, false) => format!("{} (HTTP {s}): {detail}", ErrorKind::Unknown.message()),
        };
        Classification {
            kind: ErrorKind::Unknown,
            rule: None,
            message,
        }
    }

    pub fn classify_upstream(&self, err: &UpstreamError) -> Classification {
        match err {
            UpstreamError::Http { status, body } => self.classify(*status, body),
            UpstreamError::Transport(msg) | UpstreamError::Decode(msg) => self.classify(0, msg),
        }
    }
}

/// Classify with the default rule set.
pub fn classify(status: u16, raw_detail: &str) -> ErrorKind {
    Classifier::default().classify(status, raw_detail).kind
}

/// Classify an [`UpstreamError`] with the default rule set.
pub fn classify_upstream(err: &UpstreamError) -> Classification {
    Classifier::default().classify_upstream(err)
}

/// Cut `s` to at most `max` characters, marking the cut with `…`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
