//! Interactive line-based front end.
//!
//! Line editing runs on a dedicated OS thread (rustyline blocks); the async
//! loop asks it for one line at a time so the prompt can show the current
//! runtime state.

use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

use crate::backend::Provider;
use crate::chat::SubmitOutcome;
use crate::logging;
use crate::onboarding::{OnboardingGate, OnboardingStep, SignOff};
use crate::shell::{AppShell, MainView, ShellView};
use crate::ui;
use crate::usage::LookbackWindow;

// === Commands ===

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Empty,
    Quit,
    Help,
    Toggle,
    State,
    Usage(Option<String>),
    Provider(String),
    Key(String),
    Model(String),
    Keychain,
    Reset,
    Egress,
    Accept,
    Sign,
    Prompt(String),
    Unknown(String),
}

/// Parse one input line. Anything not starting with `/` is a prompt.
#[must_use]
pub fn parse_command(line: &str) -> ShellCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ShellCommand::Empty;
    }
    let Some(rest) = trimmed.strip_prefix('/') else {
        return ShellCommand::Prompt(trimmed.to_string());
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let arg = arg.to_string();
    match name.to_ascii_lowercase().as_str() {
        "quit" | "exit" | "q" => ShellCommand::Quit,
        "help" | "?" => ShellCommand::Help,
        "pause" | "resume" | "toggle" => ShellCommand::Toggle,
        "state" | "status" => ShellCommand::State,
        "usage" => ShellCommand::Usage((!arg.is_empty()).then_some(arg)),
        "provider" => ShellCommand::Provider(arg),
        "key" => ShellCommand::Key(arg),
        "model" => ShellCommand::Model(arg),
        "keychain" => ShellCommand::Keychain,
        "reset" => ShellCommand::Reset,
        "egress" => ShellCommand::Egress,
        "accept" => ShellCommand::Accept,
        "sign" => ShellCommand::Sign,
        other => ShellCommand::Unknown(format!("/{other}")),
    }
}

const MAIN_HELP: [&str; 10] = [
    "/pause            toggle pause/resume of the runtime",
    "/state            re-query the runtime state",
    "/usage [days]     usage and cost (1, 7, 30 or 90 days)",
    "/provider <id>    select gemini, openai, anthropic, deepseek or openrouter",
    "/key <value>      save an API key for the selected provider",
    "/model <id>       override the selected provider's model",
    "/keychain         test credential storage",
    "/reset            reset the selected provider's configuration",
    "/help             show this help",
    "/quit             exit",
];

// === Line reader ===

enum ReadlineEvent {
    Line(String),
    Interrupted,
    Eof,
}

/// Handle to the readline thread.
struct LineReader {
    prompts: std_mpsc::Sender<String>,
    events: mpsc::UnboundedReceiver<ReadlineEvent>,
}

impl LineReader {
    fn spawn(history_path: Option<PathBuf>) -> Result<Self> {
        let (prompt_tx, prompt_rx) = std_mpsc::channel::<String>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("sophia-readline".into())
            .spawn(move || {
                let mut editor = match rustyline::DefaultEditor::new() {
                    Ok(editor) => editor,
                    Err(err) => {
                        logging::warn(format!("Failed to create line editor: {err}"));
                        return;
                    }
                };
                if let Some(path) = history_path.as_ref()
                    && let Err(err) = editor.load_history(path)
                {
                    logging::debug(format!("History load: {err} (expected on first run)"));
                }
                while let Ok(prompt) = prompt_rx.recv() {
                    let event = match editor.readline(&prompt) {
                        Ok(line) => {
                            // Keys typed at the prompt stay out of history.
                            let entry = line.trim();
                            if !entry.is_empty() && !entry.starts_with("/key") {
                                let _ = editor.add_history_entry(entry);
                            }
                            ReadlineEvent::Line(line)
                        }
                        Err(ReadlineError::Interrupted) => ReadlineEvent::Interrupted,
                        Err(ReadlineError::Eof) => ReadlineEvent::Eof,
                        Err(err) => {
                            logging::warn(format!("Readline error: {err}"));
                            ReadlineEvent::Eof
                        }
                    };
                    if event_tx.send(event).is_err() {
                        break;
                    }
                }
                if let Some(path) = history_path.as_ref()
                    && let Err(err) = editor.save_history(path)
                {
                    logging::debug(format!("History save failed: {err}"));
                }
            })
            .context("Failed to spawn readline thread")?;

        Ok(Self {
            prompts: prompt_tx,
            events: event_rx,
        })
    }

    /// `None` on Ctrl-D or when the reader thread is gone.
    async fn read_line(&mut self, prompt: &str) -> Option<String> {
        loop {
            if self.prompts.send(prompt.to_string()).is_err() {
                return None;
            }
            match self.events.recv().await? {
                ReadlineEvent::Line(line) => return Some(line),
                ReadlineEvent::Interrupted => {}
                ReadlineEvent::Eof => return None,
            }
        }
    }
}

fn history_path() -> Option<PathBuf> {
    let dir = crate::config::sophia_home()?;
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir.join("history.txt"))
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

// === Loop ===

enum Flow {
    Continue,
    Quit,
}

/// Run the interactive shell until the user quits.
pub async fn run(mut shell: AppShell) -> Result<()> {
    let mut reader = LineReader::spawn(history_path())?;
    let mut view = shell.bootstrap().await;

    loop {
        view = match view {
            ShellView::Loading { error } => {
                println!("Loading System...");
                if let Some(error) = error {
                    println!("{}", ui::render_error(&error));
                }
                match reader.read_line("Press Enter to retry, /quit to exit> ").await {
                    None => return Ok(()),
                    Some(line) if parse_command(&line) == ShellCommand::Quit => return Ok(()),
                    Some(_) => shell.bootstrap().await,
                }
            }
            ShellView::Onboarding(gate) => match run_onboarding(&gate, &mut reader).await {
                Flow::Quit => return Ok(()),
                Flow::Continue => shell.resume_after_onboarding(gate).await,
            },
            ShellView::Main(mut main) => {
                run_main(&mut main, &mut reader).await;
                main.shutdown().await;
                return Ok(());
            }
        };
    }
}

async fn run_onboarding(gate: &OnboardingGate, reader: &mut LineReader) -> Flow {
    let mut last_step = None;
    loop {
        let snapshot = gate.snapshot();
        let step = snapshot.phase.step();
        if last_step != Some(step) || step == OnboardingStep::Contract {
            println!();
            println!("{}", ui::onboarding::step_header(step));
            let lines = match step {
                OnboardingStep::Welcome => ui::onboarding::welcome_lines(),
                OnboardingStep::Privacy => ui::onboarding::privacy_lines(),
                OnboardingStep::Contract => ui::onboarding::contract_lines(&snapshot),
            };
            print_lines(&lines);
            last_step = Some(step);
        }

        let Some(line) = reader.read_line("onboarding> ").await else {
            return Flow::Quit;
        };
        match (step, parse_command(&line)) {
            (_, ShellCommand::Quit) => return Flow::Quit,
            (OnboardingStep::Welcome | OnboardingStep::Privacy, _) => gate.advance(),
            (OnboardingStep::Contract, ShellCommand::Key(value)) => gate.set_credential(value),
            (OnboardingStep::Contract, ShellCommand::Egress) => {
                gate.set_egress_consent(!snapshot.form.egress_consent);
            }
            (OnboardingStep::Contract, ShellCommand::Accept) => {
                gate.set_contract_accepted(!snapshot.form.contract_accepted);
            }
            (OnboardingStep::Contract, ShellCommand::Sign) => match gate.complete().await {
                SignOff::Submitted => {
                    println!("{}", ui::render_notice("Contract signed. Initializing..."));
                    return Flow::Continue;
                }
                SignOff::Rejected(_) | SignOff::Failed(_) | SignOff::Ignored => {}
            },
            (OnboardingStep::Contract, ShellCommand::Empty) => {}
            (OnboardingStep::Contract, _) => {
                println!(
                    "{}",
                    ui::render_error("Use /key <value>, /egress, /accept or /sign.")
                );
            }
        }
    }
}

async fn run_main(main: &mut MainView, reader: &mut LineReader) {
    println!();
    println!(
        "Sophia Assistant {}   type /help for commands",
        ui::state_badge(&main.supervisor.state())
    );

    loop {
        let state = main.supervisor.state();
        let prompt = format!("sophia [{}]> ", state.label());
        let Some(line) = reader.read_line(&prompt).await else {
            return;
        };
        match handle_main_command(main, parse_command(&line)).await {
            Flow::Continue => {}
            Flow::Quit => return,
        }
    }
}

async fn handle_main_command(main: &mut MainView, command: ShellCommand) -> Flow {
    match command {
        ShellCommand::Empty => {}
        ShellCommand::Quit => return Flow::Quit,
        ShellCommand::Help => print_lines(&MAIN_HELP.map(str::to_string)),
        ShellCommand::Toggle => {
            let outcome = main.supervisor.toggle_pause().await;
            if let Some(error) = outcome.error {
                println!("{}", ui::render_error(&error));
            }
            println!(
                "Runtime {}  ({} available)",
                ui::state_badge(&outcome.state),
                ui::toggle_label(&outcome.state)
            );
        }
        ShellCommand::State => {
            let state = main.supervisor.refresh().await;
            println!("Runtime {}", ui::state_badge(&state));
        }
        ShellCommand::Usage(days) => {
            if let Some(days) = days {
                match days
                    .parse::<u32>()
                    .map_err(|err| err.to_string())
                    .and_then(|days| LookbackWindow::from_days(days).map_err(|err| err.to_string()))
                {
                    Ok(window) => main.usage.set_window(window),
                    Err(err) => {
                        println!("{}", ui::render_error(&err));
                        return Flow::Continue;
                    }
                }
            }
            main.usage.load().await;
            print_lines(&ui::render_usage(&main.usage));
        }
        ShellCommand::Provider(id) => match id.parse::<Provider>() {
            Ok(provider) => {
                main.settings.select_provider(provider);
                println!("Provider: {provider}");
            }
            Err(err) => println!("{}", ui::render_error(&err.to_string())),
        },
        ShellCommand::Key(value) => {
            main.settings.set_credential(value);
            main.settings.save_credential().await;
            print_settings_message(main);
        }
        ShellCommand::Model(model) => {
            main.settings.set_model(model);
            main.settings.update_model().await;
            print_settings_message(main);
        }
        ShellCommand::Keychain => {
            main.settings.test_keychain().await;
            print_settings_message(main);
        }
        ShellCommand::Reset => {
            main.settings.reset().await;
            print_settings_message(main);
        }
        ShellCommand::Prompt(text) => {
            println!("{}", ui::thinking_line());
            let before = main.channel.transcript().len();
            if let SubmitOutcome::Rejected(reason) = main.channel.submit(&text).await {
                logging::debug(format!("prompt rejected: {reason:?}"));
            }
            let transcript = main.channel.transcript();
            for message in transcript.messages().iter().skip(before) {
                println!("{}", ui::render_message(message));
            }
        }
        ShellCommand::Egress | ShellCommand::Accept | ShellCommand::Sign => {
            println!("{}", ui::render_error("Onboarding is already complete."));
        }
        ShellCommand::Unknown(name) => {
            println!(
                "{}",
                ui::render_error(&format!("Unknown command {name}. Type /help."))
            );
        }
    }
    Flow::Continue
}

fn print_settings_message(main: &MainView) {
    if let Some(message) = main.settings.message() {
        println!("{}", ui::render_notice(message));
    }
}
