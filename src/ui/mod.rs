//! Terminal rendering for the interactive shell.
//!
//! Renderers return plain `String`s (with ANSI styling from `colored`) so the
//! REPL decides where output goes.

pub mod onboarding;

use colored::Colorize;

use crate::backend::RuntimeState;
use crate::chat::{Message, Role};
use crate::usage::{NO_USAGE_MESSAGE, UsageDashboard, format_cost, format_count};

/// Sophia color palette.
pub mod palette {
    pub const SOPHIA_VIOLET_RGB: (u8, u8, u8) = (138, 99, 210);
    pub const SOPHIA_TEAL_RGB: (u8, u8, u8) = (64, 190, 176);
    pub const SOPHIA_AMBER_RGB: (u8, u8, u8) = (240, 176, 64);
    pub const SOPHIA_RED_RGB: (u8, u8, u8) = (226, 80, 96);
    pub const SOPHIA_MUTED_RGB: (u8, u8, u8) = (128, 128, 140);
}

/// Colored `[Running]` style badge for the header line.
#[must_use]
pub fn state_badge(state: &RuntimeState) -> String {
    let (r, g, b) = match state {
        RuntimeState::Running => palette::SOPHIA_TEAL_RGB,
        RuntimeState::Paused => palette::SOPHIA_AMBER_RGB,
        RuntimeState::Unknown => palette::SOPHIA_MUTED_RGB,
        RuntimeState::Other(_) => palette::SOPHIA_VIOLET_RGB,
    };
    format!("[{}]", state.label()).truecolor(r, g, b).bold().to_string()
}

/// Label for the toggle control given the cached state.
#[must_use]
pub fn toggle_label(state: &RuntimeState) -> &'static str {
    if *state == RuntimeState::Running {
        "PAUSE"
    } else {
        "RESUME"
    }
}

#[must_use]
pub fn render_message(message: &Message) -> String {
    let (r, g, b) = match message.role {
        Role::User => palette::SOPHIA_VIOLET_RGB,
        Role::Assistant => palette::SOPHIA_TEAL_RGB,
        Role::Error => palette::SOPHIA_RED_RGB,
    };
    format!(
        "{} {}",
        format!("{}:", message.role).truecolor(r, g, b).bold(),
        message.content
    )
}

pub fn thinking_line() -> String {
    "Thinking...".dimmed().italic().to_string()
}

pub fn render_error(message: &str) -> String {
    let (r, g, b) = palette::SOPHIA_RED_RGB;
    message.truecolor(r, g, b).to_string()
}

pub fn render_notice(message: &str) -> String {
    let (r, g, b) = palette::SOPHIA_TEAL_RGB;
    message.truecolor(r, g, b).to_string()
}

/// Usage table with the aggregate cost card above it.
pub fn render_usage(dashboard: &UsageDashboard) -> Vec<String> {
    let (violet_r, violet_g, violet_b) = palette::SOPHIA_VIOLET_RGB;
    let window = dashboard.window();

    let mut lines = vec![
        "Usage & Cost Tracking"
            .truecolor(violet_r, violet_g, violet_b)
            .bold()
            .to_string(),
    ];
    if let Some(error) = dashboard.error() {
        lines.push(render_error(error));
    }
    lines.push(format!(
        "Total Cost: {}  ({})",
        format_cost(dashboard.total_cost()).bold(),
        window.label().dimmed()
    ));
    lines.push(String::new());
    lines.push(
        format!("{:<14} {:>10} {:>14} {:>14}", "Provider", "Requests", "Tokens", "Cost")
            .bold()
            .to_string(),
    );

    if dashboard.stats().is_empty() {
        lines.push(format!("  {}", NO_USAGE_MESSAGE.dimmed()));
        return lines;
    }
    for stat in dashboard.stats() {
        lines.push(format!(
            "{:<14} {:>10} {:>14} {:>14}",
            stat.provider,
            format_count(stat.total_requests),
            format_count(stat.total_tokens),
            format_cost(stat.total_cost_usd),
        ));
    }
    lines
}
