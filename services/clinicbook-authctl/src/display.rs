//! Terminal rendering for authctl output

use chrono::Utc;
use clinicbook_audit::{AuditStatistics, SecurityEvent, Severity};
use clinicbook_auth::{AuthResponse, Session};
use colored::*;
use std::time::Duration;

pub fn ok(message: &str) {
    println!("  {} {}", "✓".bright_green(), message);
}

pub fn fail(message: &str) {
    println!("  {} {}", "✗".bright_red(), message);
}

pub fn session(session: &Session) {
    let remaining = (session.expires_at - Utc::now()).num_seconds().max(0);

    println!("  {} {}", "Session".bold(), session.session_id.to_string().bright_cyan());
    println!("    user:     {} <{}>", session.user.name, session.user.email);
    println!("    role:     {}", session.user.role);
    println!("    created:  {}", session.created_at.to_rfc3339());
    println!(
        "    expires:  {} ({}m {}s left)",
        session.expires_at.to_rfc3339(),
        remaining / 60,
        remaining % 60
    );
}

pub fn login_response(response: &AuthResponse) {
    match (&response.session, &response.error) {
        (Some(session_info), _) => {
            ok("Login succeeded");
            session(session_info);
        }
        (None, Some(error)) => {
            fail(error);
            if let Some(remaining) = response.remaining_attempts {
                println!("    remaining attempts: {}", remaining.to_string().yellow());
            }
        }
        (None, None) => fail("Login failed"),
    }
}

pub fn lockout(email: &str, remaining_attempts: u32, locked_for: Option<Duration>) {
    match locked_for {
        Some(locked) => println!(
            "  {} {} locked for {}m {}s",
            "●".bright_red(),
            email,
            locked.as_secs() / 60,
            locked.as_secs() % 60
        ),
        None => println!(
            "  {} {} has {} attempt(s) remaining",
            "●".bright_green(),
            email,
            remaining_attempts
        ),
    }
}

fn severity_label(severity: Severity) -> ColoredString {
    let label = severity.to_string();
    match severity {
        Severity::Low => label.dimmed(),
        Severity::Medium => label.yellow(),
        Severity::High => label.bright_red(),
        Severity::Critical => label.on_red().white().bold(),
    }
}

pub fn events(events: &[SecurityEvent]) {
    if events.is_empty() {
        println!("  No matching events");
        return;
    }

    for event in events {
        println!(
            "  {}  {:<8}  {:<26}  {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            severity_label(event.severity),
            event.event_type.to_string().bright_cyan(),
            event.user_email.as_deref().unwrap_or("-"),
        );
        if !event.details.is_empty() {
            println!("      {}", serde_json::Value::Object(event.details.clone()).to_string().dimmed());
        }
    }
}

pub fn statistics(stats: &AuditStatistics) {
    println!("  {} {}", "Total events:".bold(), stats.total_events);
    println!(
        "  {} 24h: {}  7d: {}  30d: {}",
        "Recent:".bold(),
        stats.recent_activity.last_24h,
        stats.recent_activity.last_7d,
        stats.recent_activity.last_30d
    );

    println!("  {}", "By severity:".bold());
    for (severity, count) in &stats.events_by_severity {
        println!("    {:<10} {}", severity_label(*severity), count);
    }

    println!("  {}", "By type:".bold());
    for (event_type, count) in &stats.events_by_type {
        println!("    {:<26} {}", event_type.to_string(), count);
    }
}
