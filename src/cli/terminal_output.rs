//! Terminal reporter for a single foreground run
//!
//! Prints a `[1/3] Checkout` header per stage with a spinner while the stage
//! runs, and a separator between stages. Watch mode runs several runs at once
//! and prints plain event lines instead.

use crate::cli::output::{create_stage_spinner, format_run_event, CHECK, CROSS, SKIP, WARN};
use crate::core::StageKind;
use crate::execution::RunEvent;
use console::style;
use indicatif::ProgressBar;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// Event handler that renders one run to the terminal
#[derive(Default)]
pub struct TerminalReporter {
    spinner: Mutex<Option<ProgressBar>>,
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print a stage header, format: `[N/M] Stage`
    fn print_stage_header(&self, stage: StageKind) {
        println!(
            "\n[{}/{}] {}\n",
            style(stage.position()).cyan(),
            style(StageKind::ALL.len()).dim(),
            style(stage.title()).bold()
        );
    }

    /// A horizontal rule spanning the terminal width
    fn print_separator(&self) {
        let width = term_size::dimensions_stdout()
            .map(|(w, _)| w)
            .unwrap_or(80);
        println!("{}", style("─".repeat(width)).dim());
    }

    fn start_spinner(&self, stage: StageKind) {
        let mut slot = self.spinner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = slot.take() {
            old.finish_and_clear();
        }
        *slot = Some(create_stage_spinner(stage));
    }

    fn stop_spinner(&self) {
        let mut slot = self.spinner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(spinner) = slot.take() {
            spinner.finish_and_clear();
        }
    }

    pub fn on_event(&self, event: &RunEvent) {
        match event {
            RunEvent::RunStarted { .. } => {
                println!("{}", format_run_event(event));
            }
            RunEvent::StageStarted { stage, .. } => {
                if *stage != StageKind::Checkout {
                    self.print_separator();
                }
                self.print_stage_header(*stage);
                self.start_spinner(*stage);
            }
            RunEvent::StageCompleted { summary, .. } => {
                self.stop_spinner();
                println!("{} {}", CHECK, summary);
            }
            RunEvent::StageFailed { error, .. } => {
                self.stop_spinner();
                println!("{} {}", CROSS, style(error).red());
            }
            RunEvent::StageSkipped { stage, reason, .. } => {
                println!("{} {} skipped: {}", SKIP, stage.title(), style(reason).dim());
            }
            RunEvent::RunCancelled { .. } => {
                self.stop_spinner();
                println!("{} {}", WARN, format_run_event(event));
            }
            RunEvent::RunCompleted { .. } => {
                self.stop_spinner();
                self.print_separator();
            }
        }
        let _ = io::stdout().flush();
    }
}
