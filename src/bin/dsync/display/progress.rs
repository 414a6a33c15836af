use std::io::{self, Write};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

const SPINNER_TICK: Duration = Duration::from_millis(80);

/// Numbered setup phases of a command, each shown as a spinner that turns
/// into a check mark with its elapsed time. Prints nothing when silent.
pub struct Progress {
    phases: Option<Phases>,
}

struct Phases {
    total: u8,
    current: u8,
    run_start: Instant,
    phase_start: Instant,
    spinner: Option<ProgressBar>,
}

impl Phases {
    fn clear_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl Progress {
    pub fn new(interactive: bool, total_steps: u8) -> Self {
        let now = Instant::now();
        Self {
            phases: interactive.then_some(Phases {
                total: total_steps,
                current: 0,
                run_start: now,
                phase_start: now,
                spinner: None,
            }),
        }
    }

    pub fn step(&mut self, description: &str) {
        let Some(p) = self.phases.as_mut() else {
            return;
        };
        p.clear_spinner();
        p.current += 1;
        p.phase_start = Instant::now();

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
            spinner.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }
        spinner.enable_steady_tick(SPINNER_TICK);
        spinner.set_message(format!("[{}/{}] {description}...", p.current, p.total));
        p.spinner = Some(spinner);
    }

    /// Replaces the spinner with a check mark and lists `details` under it.
    pub fn complete_step(&mut self, description: &str, details: &[String]) {
        let Some(p) = self.phases.as_mut() else {
            return;
        };
        p.clear_spinner();
        let secs = p.phase_start.elapsed().as_secs_f64();
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "  \x1b[32m✓\x1b[0m {description:<44} {secs:>5.1}s");
        for detail in details {
            let _ = writeln!(err, "      \x1b[2m·\x1b[0m {detail}");
        }
    }

    pub fn finish(self) {
        let Some(mut p) = self.phases else {
            return;
        };
        p.clear_spinner();
        let total = format!("Total: {:.2}s", p.run_start.elapsed().as_secs_f64());
        let rule = "━".repeat(54);
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "\n  \x1b[2m╺{rule}╸\x1b[0m\n");
        let _ = writeln!(err, "  \x1b[32m✓\x1b[0m Run complete {total:>37}\n");
    }
}

/// Bar over simulation steps, advanced as each step is verified on every
/// rank. Hidden when not interactive.
pub struct StepBar {
    bar: ProgressBar,
}

impl StepBar {
    pub fn new(interactive: bool, steps: usize) -> Self {
        let bar = if interactive {
            ProgressBar::new(steps as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos:>5}/{len:5} {msg}")
        {
            bar.set_style(style.progress_chars("━╸ "));
        }
        Self { bar }
    }

    pub fn advance(&mut self, moved: usize, split: usize) {
        self.bar.set_message(format!("{moved} moved, {split} split"));
        self.bar.inc(1);
    }

    pub fn finish(self) {
        self.bar.finish_and_clear();
    }
}
