//! Onboarding screen content.

use colored::Colorize;

use crate::onboarding::{GatePhase, GateState, OnboardingStep};
use crate::ui::palette;

const LOGO: &str = r"
 ___  ___  ___  _ _  _  ___
/ __|/ _ \| . \| | || |/ . |
\__ \ |_| |  _/|   || ||   |
|___/\___/|_|  |_|_||_||_|_|
";

/// `Step n/3` header shown above every onboarding screen.
#[must_use]
pub fn step_header(step: OnboardingStep) -> String {
    let (r, g, b) = palette::SOPHIA_MUTED_RGB;
    format!("Step {}/{}", step.index() + 1, OnboardingStep::COUNT)
        .truecolor(r, g, b)
        .bold()
        .to_string()
}

pub fn welcome_lines() -> Vec<String> {
    let (violet_r, violet_g, violet_b) = palette::SOPHIA_VIOLET_RGB;
    let (teal_r, teal_g, teal_b) = palette::SOPHIA_TEAL_RGB;

    let mut lines: Vec<String> = LOGO
        .lines()
        .enumerate()
        .map(|(i, line)| {
            if i % 2 == 0 {
                line.truecolor(violet_r, violet_g, violet_b).bold().to_string()
            } else {
                line.truecolor(teal_r, teal_g, teal_b).bold().to_string()
            }
        })
        .collect();
    lines.push(String::new());
    lines.push(format!(
        "Welcome to {}",
        "Sophia".truecolor(violet_r, violet_g, violet_b).bold()
    ));
    lines.push(format!("Version {}", env!("CARGO_PKG_VERSION")).dimmed().to_string());
    lines.push("Your local-only, explicitly trusted assistant.".to_string());
    lines.push(String::new());
    lines.push("Press Enter to get started.".to_string());
    lines
}

pub fn privacy_lines() -> Vec<String> {
    vec![
        "Privacy First".bold().to_string(),
        String::new(),
        "  - Everything runs on your device.".to_string(),
        "  - No data is sent to the cloud without approval.".to_string(),
        "  - You hold the keys.".to_string(),
        String::new(),
        "Press Enter if you understand.".to_string(),
    ]
}

/// Contract step: key field, egress consent, contract text and any banner.
pub fn contract_lines(state: &GateState) -> Vec<String> {
    let (err_r, err_g, err_b) = palette::SOPHIA_RED_RGB;
    let form = &state.form;

    let mut lines = vec![
        "Gemini Key (Required)".bold().to_string(),
        "Provide your Gemini API key. It will be stored locally in your keychain.".to_string(),
        format!("  key:     {}", display_key(&form.credential)),
        format!(
            "  {} I understand this will send requests directly to Gemini (network egress).",
            checkbox(form.egress_consent)
        ),
        String::new(),
        format!("Operating Contract {}", state.contract.version.as_str().dimmed()),
    ];
    lines.extend(state.contract.clauses.iter().map(|clause| format!("  {clause}")));
    lines.push(format!(
        "  {} I agree to these terms explicitly.",
        checkbox(form.contract_accepted)
    ));

    if let Some(message) = state.message() {
        lines.push(String::new());
        lines.push(message.truecolor(err_r, err_g, err_b).to_string());
    }
    if state.phase == GatePhase::ContractSubmitting {
        lines.push("Signing...".dimmed().to_string());
    }
    lines.push(String::new());
    lines.push(
        "Commands: /key <value>  /egress  /accept  /sign"
            .dimmed()
            .to_string(),
    );
    lines
}

fn checkbox(checked: bool) -> &'static str {
    if checked { "[x]" } else { "[ ]" }
}

fn display_key(key: &str) -> String {
    let masked = mask_key(key);
    if masked.is_empty() {
        "(not set)".dimmed().to_string()
    } else {
        masked
    }
}

/// Mask all but the last four characters of a secret.
#[must_use]
pub fn mask_key(input: &str) -> String {
    let trimmed = input.trim();
    let len = trimmed.chars().count();
    if len == 0 {
        return String::new();
    }
    if len <= 4 {
        return "*".repeat(len);
    }
    let visible: String = trimmed.chars().skip(len - 4).collect();
    format!("{}{visible}", "*".repeat(len - 4))
}
