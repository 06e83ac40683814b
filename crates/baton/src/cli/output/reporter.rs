//! Terminal rendering of task events

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use console::{style, Color, Style};

use baton_core::config::LogOrder;
use baton_tasks::{ColorSelector, TaskEvent, TaskId, TaskReporter};

/// Prefix colours, indexed by [`ColorSelector`] slot
pub const PALETTE: [Color; 5] = [Color::Cyan, Color::Magenta, Color::Green, Color::Yellow, Color::Blue];

/// Prints task output with a coloured `package:task:` prefix.
///
/// In grouped mode each task's lines are held back and printed as one block
/// when the task finishes.
pub struct ConsoleReporter {
    colors: Arc<ColorSelector>,
    log_order: LogOrder,
    verbose: bool,
    pending: Mutex<HashMap<TaskId, Vec<(String, bool)>>>,
}

impl ConsoleReporter {
    pub fn new(colors: Arc<ColorSelector>, log_order: LogOrder, verbose: bool) -> Self {
        Self {
            colors,
            log_order,
            verbose,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn format_line(&self, id: &TaskId, text: &str) -> String {
        let color = PALETTE[self.colors.color_for(&id.package) % PALETTE.len()];
        let prefix = Style::new().fg(color).apply_to(format!("{}:{}:", id.package, id.task));
        format!("{} {}", prefix, text)
    }

    fn emit(&self, id: &TaskId, text: String, is_stderr: bool) {
        match self.log_order {
            LogOrder::Stream => self.print(id, &text, is_stderr),
            LogOrder::Grouped => {
                if let Ok(mut pending) = self.pending.lock() {
                    pending.entry(id.clone()).or_default().push((text, is_stderr));
                }
            }
        }
    }

    fn flush(&self, id: &TaskId) {
        let lines = self
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(id))
            .unwrap_or_default();
        for (text, is_stderr) in lines {
            self.print(id, &text, is_stderr);
        }
    }

    fn print(&self, id: &TaskId, text: &str, is_stderr: bool) {
        let line = self.format_line(id, text);
        if is_stderr {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Output { id, line, is_stderr } => self.emit(id, line.clone(), *is_stderr),
            TaskEvent::Message { id, text } => self.emit(id, text.clone(), false),
            TaskEvent::Started { id, command } => {
                if self.verbose {
                    self.emit(id, style(format!("$ {}", command)).dim().to_string(), false);
                }
            }
            TaskEvent::Completed { id, .. } => self.flush(id),
            TaskEvent::Failed { id, error, .. } => {
                self.emit(id, style(format!("ERROR: {}", error)).red().to_string(), true);
                self.flush(id);
            }
            TaskEvent::Skipped { id, reason } => {
                if self.verbose {
                    self.emit(id, style(format!("skipped ({})", reason)).yellow().to_string(), false);
                }
                self.flush(id);
            }
            TaskEvent::Hashing { .. }
            | TaskEvent::CacheHit { .. }
            | TaskEvent::CacheMiss { .. }
            | TaskEvent::RunCompleted { .. } => {}
        }
    }
}
