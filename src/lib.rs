//! Sophia shell: a consent-gated control surface for the local assistant
//! runtime.
//!
//! The shell refuses to show anything but onboarding until the runtime
//! reports a signed operating contract. After that it supervises the
//! runtime's pause state, relays prompts, and exposes provider settings and
//! usage reporting. All side effects go through [`backend::Backend`].

pub mod audit;
pub mod backend;
pub mod chat;
pub mod config;
pub mod error_taxonomy;
pub mod logging;
pub mod onboarding;
pub mod repl;
pub mod scheduler;
pub mod settings;
pub mod shell;
pub mod supervisor;
pub mod ui;
pub mod usage;

#[cfg(test)]
mod test_support;
