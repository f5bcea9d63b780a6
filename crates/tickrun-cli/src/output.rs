//! Console rendering of a tick's lifecycle.

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

use tickrun_core::{RunContext, RunObserver, TaskResult, TaskRunContext};

/// Writes a human-readable account of the tick.
///
/// Verbosity 1 adds captured task output; 2 also reports ticks with
/// nothing due.
pub struct ConsoleOutput<W: Write + Send = io::Stdout> {
    out: Mutex<W>,
    verbosity: u8,
}

impl ConsoleOutput<io::Stdout> {
    /// Console output on stdout.
    pub fn stdout(verbosity: u8) -> Self {
        Self::new(io::stdout(), verbosity)
    }
}

impl<W: Write + Send> ConsoleOutput<W> {
    pub fn new(out: W, verbosity: u8) -> Self {
        Self {
            out: Mutex::new(out),
            verbosity,
        }
    }

    /// Consume and return the writer.
    #[cfg(test)]
    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn out(&self) -> MutexGuard<'_, W> {
        match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn line(&self, text: &str) {
        // Console output is best effort; a closed stdout must not fail the tick.
        let _ = writeln!(self.out(), "{}", text);
    }
}

impl<W: Write + Send> RunObserver for ConsoleOutput<W> {
    fn before_run(&self, context: &RunContext) {
        if let Some(message) = before_run_message(context) {
            self.line(&message);
        } else if self.verbosity >= 2 && !context.is_skipped() {
            self.line(&format!(
                " ! [NOTE] No tasks due to run. ({} total tasks)",
                context.total_tasks()
            ));
        }
    }

    fn before_task(&self, context: &TaskRunContext) {
        let task = context.task();
        self.line(&format!(
            "{}Running {}: {}",
            force_prefix(context.is_force_run()),
            task.kind,
            task.description
        ));
    }

    fn after_task(&self, context: &TaskRunContext) {
        let Some(result) = context.result() else {
            return;
        };

        if self.verbosity >= 1 {
            if let Some(output) = result.output.as_deref() {
                self.line("---begin output---");
                self.line(output.trim_end());
                self.line("---end output---");
            }
        }

        self.line(&format!(
            "{} (Duration: {}, Memory: {})",
            after_task_message(result),
            context.formatted_duration(),
            context.formatted_memory()
        ));
        self.line("");
    }

    fn after_run(&self, context: &RunContext) {
        if let Some(reason) = context.skip_reason() {
            self.line(&format!(" ! [NOTE] {}", reason));
            return;
        }
        if let Some(summary) = summary_message(context) {
            let style = if context.is_successful() {
                "[OK]"
            } else {
                "[ERROR]"
            };
            self.line(&format!(" {} {}", style, summary));
        }
    }
}

fn force_prefix(is_force_run: bool) -> &'static str {
    if is_force_run {
        "Force "
    } else {
        ""
    }
}

/// "Running 2 due tasks. (5 total tasks)", or `None` when nothing is due.
pub fn before_run_message(context: &RunContext) -> Option<String> {
    let due = context.due_tasks().len();
    if due == 0 {
        return None;
    }
    Some(format!(
        "{}Running {} {}task{}. ({} total tasks)",
        force_prefix(context.is_force_run()),
        due,
        if context.is_force_run() { "" } else { "due " },
        if due > 1 { "s" } else { "" },
        context.total_tasks()
    ))
}

pub fn after_task_message(result: &TaskResult) -> String {
    if result.is_exception() {
        format!("Exception: {}", result.description)
    } else if result.is_failure() {
        format!("Failure: {}", result.description)
    } else if result.is_skipped() {
        format!("Skipped: {}", result.description)
    } else {
        "Success.".to_string()
    }
}

/// "2/3 tasks ran, 1 succeeded, 1 skipped, 1 failed. (Duration: …, Memory: …)".
///
/// `None` when the tick has no results.
pub fn summary_message(context: &RunContext) -> Option<String> {
    let total = context.results().len();
    if total == 0 {
        return None;
    }

    let mut parts = vec![format!("{}/{} tasks ran", context.run().len(), total)];
    let counts = [
        (context.successful().len(), "succeeded"),
        (context.skipped().len(), "skipped"),
        (context.failures().len(), "failed"),
    ];
    for (count, label) in counts {
        if count > 0 {
            parts.push(format!("{} {}", count, label));
        }
    }

    Some(format!(
        "{}. (Duration: {}, Memory: {})",
        parts.join(", "),
        context.formatted_duration(),
        context.formatted_memory()
    ))
}
