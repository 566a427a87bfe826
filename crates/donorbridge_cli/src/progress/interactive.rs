use std::sync::Mutex;
use std::time::Duration;

use console::style;
use donorbridge::sync::SyncProgress;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Progress state under a single lock.
#[derive(Default)]
struct ProgressState {
    bar: Option<ProgressBar>,
    /// Whether the total is known (set by the first completed batch).
    sized: bool,
}

/// Interactive progress reporter using indicatif.
///
/// A single bar tracks the backfill. It starts as a spinner and becomes a
/// bar once the first batch reports how many donations remain.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    fn bar<'a>(&self, state: &'a mut ProgressState) -> &'a ProgressBar {
        state.bar.get_or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new_spinner());
            bar.set_style(Self::spinner_style());
            bar.set_prefix(format!("{:10}", "backfill"));
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        })
    }

    /// Print a line above the bar.
    fn note(&self, line: String) {
        if self.multi.println(&line).is_err() {
            eprintln!("{line}");
        }
    }

    pub fn handle(&self, event: SyncProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            SyncProgress::BatchStarted { batch, .. } => {
                self.bar(&mut state)
                    .set_message(format!("Syncing batch {batch}..."));
            }

            SyncProgress::DonationSynced { .. } | SyncProgress::DonationSkipped { .. } => {
                self.bar(&mut state).inc(1);
            }

            SyncProgress::DonationFailed {
                donation_id,
                error,
                ..
            } => {
                self.bar(&mut state).inc(1);
                self.note(format!(
                    "{} Donation #{}: {}",
                    style("✗").red(),
                    donation_id,
                    error
                ));
            }

            SyncProgress::BatchComplete {
                batch, remaining, ..
            } => {
                let sized = state.sized;
                let bar = self.bar(&mut state);
                if !sized {
                    bar.set_style(Self::bar_style());
                    bar.disable_steady_tick();
                }
                bar.set_length(bar.position() + remaining);
                bar.set_message(format!("{remaining} remaining after batch {batch}"));
                state.sized = true;
            }

            SyncProgress::BatchRetry {
                attempt,
                retry_after_ms,
                error,
            } => {
                self.bar(&mut state).set_message(format!(
                    "Retry {} in {:.1}s: {}",
                    attempt,
                    retry_after_ms as f64 / 1000.0,
                    error
                ));
            }

            SyncProgress::BackfillCancelled { processed } => {
                if let Some(bar) = state.bar.take() {
                    bar.abandon_with_message(format!(
                        "{} Cancelled after {} donations",
                        style("!").yellow(),
                        processed
                    ));
                }
            }

            SyncProgress::BackfillFailed { error } => {
                if let Some(bar) = state.bar.take() {
                    bar.abandon_with_message(format!("{} {}", style("✗").red(), error));
                }
            }

            SyncProgress::BackfillComplete {
                succeeded,
                failed,
                skipped,
                ..
            } => {
                let bar = self.bar(&mut state).clone();
                state.bar = None;
                bar.finish_with_message(format!(
                    "{} {} synced, {} failed, {} skipped",
                    style("✓").green(),
                    succeeded,
                    failed,
                    skipped
                ));
            }

            SyncProgress::Warning { message } => {
                self.note(format!("{} {}", style("⚠").yellow(), message));
            }

            _ => {}
        }
    }

    pub fn finish(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bar) = state.bar.take() {
            bar.finish();
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {pos} donations {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>4}/{len:4} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
