use axum::http::StatusCode;
use keygate_shared::ValidationStatus;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A security event produced by a check. Customer, license and IP are
/// attached when the decision is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub event_type: &'static str,
    pub severity: Severity,
    pub details: Value,
}

impl EventDraft {
    pub fn new(event_type: &'static str, severity: Severity, details: Value) -> Self {
        Self {
            event_type,
            severity,
            details,
        }
    }
}

/// Lifecycle change applied to the license together with the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Expire,
    Suspend,
}

impl Transition {
    pub fn target_status(&self) -> &'static str {
        match self {
            Self::Expire => "expired",
            Self::Suspend => "suspended",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub status: ValidationStatus,
    pub http_status: StatusCode,
    pub message: String,
    pub event: Option<EventDraft>,
    pub transition: Option<Transition>,
}

impl Rejection {
    pub fn new(status: ValidationStatus, http_status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            http_status,
            message: message.into(),
            event: None,
            transition: None,
        }
    }

    /// Lifecycle outcomes are answered with 200 and `valid = false`.
    pub fn lifecycle(status: ValidationStatus, message: impl Into<String>) -> Self {
        Self::new(status, StatusCode::OK, message)
    }

    /// Rule violations are answered with 403.
    pub fn policy(status: ValidationStatus, message: impl Into<String>) -> Self {
        Self::new(status, StatusCode::FORBIDDEN, message)
    }

    pub fn with_event(mut self, event: EventDraft) -> Self {
        self.event = Some(event);
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transition = Some(transition);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateNotice {
    pub latest_version: String,
    pub update_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted { update: Option<UpdateNotice> },
    Rejected(Rejection),
}

/// Result of running the pipeline: the verdict plus every security event
/// that has to be written alongside the attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub verdict: Verdict,
    pub events: Vec<EventDraft>,
}

impl Decision {
    pub fn rejected(mut rejection: Rejection, mut events: Vec<EventDraft>) -> Self {
        if let Some(event) = rejection.event.take() {
            events.push(event);
        }
        Self {
            verdict: Verdict::Rejected(rejection),
            events,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.verdict, Verdict::Accepted { .. })
    }

    pub fn status(&self) -> ValidationStatus {
        match &self.verdict {
            Verdict::Accepted { .. } => ValidationStatus::Active,
            Verdict::Rejected(r) => r.status,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match &self.verdict {
            Verdict::Accepted { .. } => StatusCode::OK,
            Verdict::Rejected(r) => r.http_status,
        }
    }

    pub fn message(&self) -> &str {
        match &self.verdict {
            Verdict::Accepted { .. } => "License is valid",
            Verdict::Rejected(r) => &r.message,
        }
    }

    pub fn transition(&self) -> Option<Transition> {
        match &self.verdict {
            Verdict::Accepted { .. } => None,
            Verdict::Rejected(r) => r.transition,
        }
    }

    pub fn update(&self) -> Option<&UpdateNotice> {
        match &self.verdict {
            Verdict::Accepted { update } => update.as_ref(),
            Verdict::Rejected(_) => None,
        }
    }
}
