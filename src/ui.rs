//! Terminal output for the `demo` command: spinner while the job runs and a
//! colored summary once it reached a terminal status.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::state_machine::{BatchStatus, ExecutionSummary};

pub struct RunProgress {
    // Spinner shown while the job runs.
    pb: ProgressBar,
    // Completed runs.
    green: Style,
    // Failed runs.
    red: Style,
    // Stopped runs and stop requests.
    yellow: Style,
}

impl RunProgress {
    /// Starts the spinner for the given job.
    pub fn start(job_name: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("running {job_name}"));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow().bold(),
        }
    }

    pub fn stop_requested(&self, status: BatchStatus) {
        self.pb.println(format!(
            "  {} stop requested (status {status})",
            self.yellow.apply_to("■")
        ));
    }

    /// Clears the spinner and prints the outcome.
    pub fn finish(&self, summary: &ExecutionSummary) {
        self.pb.finish_and_clear();
        let exit = summary.exit_status.as_deref().unwrap_or("-");
        match summary.status {
            BatchStatus::Completed => println!(
                "  {} {} completed (exit status: {exit})",
                self.green.apply_to("✓"),
                summary.job_name
            ),
            BatchStatus::Stopped => println!(
                "  {} {} stopped, restart from {} (exit status: {exit})",
                self.yellow.apply_to("■"),
                summary.job_name,
                summary.restart_position
            ),
            status => println!(
                "  {} {} {status}, restart from {} (exit status: {exit})",
                self.red.apply_to("✗"),
                summary.job_name,
                summary.restart_position
            ),
        }
    }

    /// Prints the execution summary as pretty JSON.
    pub fn print_summary(&self, summary: &ExecutionSummary) {
        let style = match summary.status {
            BatchStatus::Completed => &self.green,
            BatchStatus::Failed => &self.red,
            _ => &self.yellow,
        };
        println!();
        println!("{}", style.apply_to("─── Job Execution ───"));
        println!("{}", serde_json::to_string_pretty(summary).unwrap_or_default());
    }
}
