//! Live build status display
//!
//! Maintains a private snapshot of every item and re-renders a status
//! block whenever a snapshot actually changes. The block is erased and
//! redrawn in place on a terminal; on plain streams only the final
//! render is printed. Rendering may be triggered from a different OS
//! thread than the scheduler (interrupt and abort paths), so the
//! snapshot sits behind a mutex.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crossterm::style::{Color, Stylize};
use crossterm::tty::IsTty;
use crossterm::{cursor, terminal, QueueableCommand};

use crate::core::item::{BuildItem, BuildState};

/// The situation a render is produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderWhen {
    /// Regular in-progress update
    Running,
    /// Final render after a normal return
    Done,
    /// Final render after a signal interrupt
    Interrupted,
    /// Final render after an aborting error
    Exception,
}

#[derive(Debug, Default)]
struct DisplayState {
    items: BTreeMap<String, BuildItem>,
    lines_rendered: usize,
    cursor_hidden: bool,
}

/// Thread-safe snapshot renderer for a scheduling run.
#[derive(Debug)]
pub struct BuildDisplay {
    state: Mutex<DisplayState>,
    tty: bool,
}

impl BuildDisplay {
    /// Create an empty display.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DisplayState::default()),
            tty: io::stderr().is_tty(),
        }
    }

    /// Absorb updated items; re-render only if any snapshot changed.
    pub fn update_items<'a>(&self, items: impl IntoIterator<Item = &'a BuildItem>) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let mut changed = false;
        for item in items {
            let stale = state
                .items
                .get(&item.name)
                .map_or(true, |old| old != item);
            if stale {
                state.items.insert(item.name.clone(), item.clone());
                changed = true;
            }
        }
        if changed {
            self.render_locked(&mut state, RenderWhen::Running);
        }
    }

    /// Render the current snapshot for the given situation.
    pub fn render(&self, when: RenderWhen) {
        if let Ok(mut state) = self.state.lock() {
            self.render_locked(&mut state, when);
        }
    }

    /// Hide the cursor for the duration of the run. Paired with the
    /// final [`render`](Self::render), which restores it.
    pub fn activate(self: Arc<Self>) -> DisplayGuard {
        if self.tty {
            if let Ok(mut state) = self.state.lock() {
                let mut stderr = io::stderr();
                let _ = stderr.queue(cursor::Hide);
                let _ = stderr.flush();
                state.cursor_hidden = true;
            }
        }
        DisplayGuard { display: self }
    }

    fn render_locked(&self, state: &mut DisplayState, when: RenderWhen) {
        // Plain streams only see the final screen.
        if !self.tty && when == RenderWhen::Running {
            return;
        }

        let mut stderr = io::stderr();
        if self.tty {
            let _ = stderr.queue(cursor::MoveToColumn(0));
            let _ = stderr.queue(terminal::Clear(terminal::ClearType::CurrentLine));
            for _ in 0..state.lines_rendered {
                let _ = stderr.queue(cursor::MoveUp(1));
                let _ = stderr.queue(terminal::Clear(terminal::ClearType::CurrentLine));
            }
        }

        let width = if self.tty {
            terminal::size().map_or(usize::MAX, |(w, _)| w.max(2) as usize - 1)
        } else {
            usize::MAX
        };

        let lines = format_lines(&state.items, when, self.tty);
        for line in &lines {
            let visible = clip_line(line, width);
            let _ = writeln!(stderr, "{visible}");
        }
        state.lines_rendered = if self.tty { lines.len() } else { 0 };

        if state.cursor_hidden && when != RenderWhen::Running {
            let _ = stderr.queue(cursor::Show);
            state.cursor_hidden = false;
        }
        let _ = stderr.flush();
    }
}

impl Default for BuildDisplay {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores the cursor if the run is torn down without a final render.
#[derive(Debug)]
pub struct DisplayGuard {
    display: Arc<BuildDisplay>,
}

impl Drop for DisplayGuard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.display.state.lock() {
            if state.cursor_hidden {
                let mut stderr = io::stderr();
                let _ = stderr.queue(cursor::Show);
                let _ = stderr.flush();
                state.cursor_hidden = false;
            }
        }
    }
}

/// Produce the status block for a snapshot.
///
/// One header line per item plus detail lines (logs, remote task,
/// children, debug hints) for everything not yet `Done`.
fn format_lines(
    items: &BTreeMap<String, BuildItem>,
    when: RenderWhen,
    styled: bool,
) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push("--------------------------------------------".to_string());

    for item in items.values() {
        let mut status = item.status.as_str();
        let color = match item.state() {
            BuildState::Done => Some(Color::Green),
            BuildState::Failed => Some(Color::Red),
            BuildState::Building { .. } => match when {
                RenderWhen::Exception => Some(Color::Red),
                RenderWhen::Interrupted => {
                    status = "Interrupted";
                    Some(Color::Yellow)
                }
                _ => Some(Color::Blue),
            },
            _ => None,
        };

        let header = if styled {
            let name = format!("{}:", item.name);
            let name = match color {
                Some(color) => name.bold().with(color),
                None => name.bold(),
            };
            format!("{name} {status}")
        } else {
            format!("{}: {status}", item.name)
        };
        lines.push(header);

        if !matches!(item.state(), BuildState::Done) {
            for log_file in &item.log_files {
                lines.push(format!("    {}", log_file.display()));
            }
            if let Some(task) = &item.task {
                lines.push(format!("    {task}"));
            }
            for child in &item.task_children {
                lines.push(format!("        {child}"));
            }
            for message in &item.debug_messages {
                lines.push(format!("    {message}"));
            }
        }
    }
    lines
}

/// Clip a line to the terminal width so erase/redraw stays aligned,
/// counting only characters outside ANSI escape sequences.
fn clip_line(line: &str, width: usize) -> String {
    if width == usize::MAX {
        return line.to_string();
    }
    let mut out = String::new();
    let mut visible = 0;
    let mut in_escape = false;
    for ch in line.chars() {
        if in_escape {
            out.push(ch);
            if ch.is_ascii_alphabetic() {
                in_escape = false;
            }
            continue;
        }
        if ch == '\u{1b}' {
            in_escape = true;
            out.push(ch);
            continue;
        }
        if visible >= width {
            continue;
        }
        out.push(ch);
        visible += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::item::BuildSource;

    fn item(name: &str, state: &str) -> BuildItem {
        let mut item = BuildItem::new(name, BuildSource::Artifact(format!("{name}.src")));
        match state {
            "ready" => {
                item.transition(BuildState::Ready).unwrap();
            }
            "building" => {
                item.transition(BuildState::Ready).unwrap();
                item.transition(BuildState::Building { slot: 0 }).unwrap();
            }
            "done" => {
                item.transition(BuildState::Ready).unwrap();
                item.transition(BuildState::Building { slot: 0 }).unwrap();
                item.transition(BuildState::Done).unwrap();
            }
            "failed" => {
                item.transition(BuildState::Ready).unwrap();
                item.transition(BuildState::Building { slot: 0 }).unwrap();
                item.transition(BuildState::Failed).unwrap();
            }
            _ => {}
        }
        item
    }

    fn snapshot(items: Vec<BuildItem>) -> BTreeMap<String, BuildItem> {
        items
            .into_iter()
            .map(|item| (item.name.clone(), item))
            .collect()
    }

    #[test]
    fn test_final_snapshot_lists_every_item_once() {
        let mut done = item("a", "done");
        done.status = "Built successfully".to_string();
        let mut failed = item("b", "failed");
        failed.status = "Build failed".to_string();
        let items = snapshot(vec![done, failed]);

        let lines = format_lines(&items, RenderWhen::Done, false);
        let a_lines = lines.iter().filter(|l| l.starts_with("a:")).count();
        let b_lines = lines.iter().filter(|l| l.starts_with("b:")).count();
        assert_eq!(a_lines, 1);
        assert_eq!(b_lines, 1);
        assert!(lines.contains(&"a: Built successfully".to_string()));
        assert!(lines.contains(&"b: Build failed".to_string()));
    }

    #[test]
    fn test_interrupted_rewrites_building_status() {
        let mut building = item("a", "building");
        building.status = "compiling".to_string();
        let items = snapshot(vec![building]);

        let lines = format_lines(&items, RenderWhen::Interrupted, false);
        assert!(lines.contains(&"a: Interrupted".to_string()));
    }

    #[test]
    fn test_details_hidden_for_done_items() {
        let mut done = item("a", "done");
        done.log_files = vec!["build.log".into()];
        let mut failed = item("b", "failed");
        failed.log_files = vec!["root.log".into()];
        failed.debug_messages = vec!["Build root: /tmp/x".to_string()];
        let items = snapshot(vec![done, failed]);

        let lines = format_lines(&items, RenderWhen::Done, false);
        assert!(!lines.contains(&"    build.log".to_string()));
        assert!(lines.contains(&"    root.log".to_string()));
        assert!(lines.contains(&"    Build root: /tmp/x".to_string()));
    }

    #[test]
    fn test_update_items_ignores_unchanged_snapshots() {
        let display = BuildDisplay::new();
        let a = item("a", "ready");
        display.update_items(std::iter::once(&a));
        {
            let state = display.state.lock().unwrap();
            assert_eq!(state.items.len(), 1);
        }
        // Same value again: the stored snapshot is not replaced.
        display.update_items(std::iter::once(&a));
        let state = display.state.lock().unwrap();
        assert_eq!(state.items["a"], a);
    }

    #[test]
    fn test_clip_line_keeps_escape_sequences() {
        let line = "\u{1b}[1mabcdef\u{1b}[0m";
        let clipped = clip_line(line, 3);
        assert_eq!(clipped, "\u{1b}[1mabc\u{1b}[0m");
    }
}
