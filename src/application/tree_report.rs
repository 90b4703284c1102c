use std::fmt::Write as _;

use colored::{Color, Colorize};

use crate::changes::{ChangeEvent, ChangeKind};
use crate::filesystem::PathTree;
use crate::path;

fn paint(text: &str, color: Color, colorize: bool) -> String {
    if colorize {
        text.color(color).to_string()
    } else {
        text.to_string()
    }
}

fn kind_color(kind: ChangeKind) -> Color {
    match kind {
        ChangeKind::Add | ChangeKind::AddDir => Color::Green,
        ChangeKind::Change => Color::Yellow,
        ChangeKind::Unlink | ChangeKind::UnlinkDir => Color::Red,
    }
}

pub fn render_changes(events: &[ChangeEvent], colorize: bool) -> String {
    let mut output = String::from("Committed changes:\n");
    for event in events {
        let line = event.to_string();
        let _ = writeln!(output, "  {}", paint(&line, kind_color(event.kind()), colorize));
    }
    output
}

/// Indented listing of `tree`, directories suffixed with `/`.
pub fn render_tree<T>(tree: &PathTree<T>, colorize: bool) -> String {
    let mut output = String::from("Mirrored tree:\n");
    for entry in tree.list_all() {
        let segments = path::segments(&entry).collect::<Vec<_>>();
        let Some(name) = segments.last() else {
            continue;
        };
        let indent = "  ".repeat(segments.len());
        let line = if tree.is_dir(&entry).unwrap_or(false) {
            paint(&format!("{name}/"), Color::Blue, colorize)
        } else {
            name.to_string()
        };
        let _ = writeln!(output, "{indent}{line}");
    }
    output
}

pub fn render_failures(events: &[ChangeEvent], colorize: bool) -> String {
    let mut output = paint("Failed changes:", Color::Red, colorize);
    output.push('\n');
    for event in events {
        let _ = writeln!(output, "  {event}");
    }
    output
}
