//! Boxed terminal panels for replies and banners.

use std::io;
use std::os::fd::AsRawFd;

use crossterm::style::{Color, Stylize};
use textwrap::core::display_width;

const MIN_WIDTH: usize = 40;
const MAX_WIDTH: usize = 120;
const DEFAULT_WIDTH: usize = 80;
/// Columns of padding between the border and the text.
const PAD_X: usize = 2;
const BORDER: Color = Color::Blue;

/// Width to draw panels at, following the terminal when it can be queried.
pub fn terminal_width() -> usize {
    crossterm::terminal::size()
        .map(|(cols, _)| cols as usize)
        .unwrap_or(DEFAULT_WIDTH)
        .clamp(MIN_WIDTH, MAX_WIDTH)
}

pub fn stdin_is_tty() -> bool {
    nix::unistd::isatty(io::stdin().as_raw_fd()).unwrap_or(false)
}

pub fn stdout_is_tty() -> bool {
    nix::unistd::isatty(io::stdout().as_raw_fd()).unwrap_or(false)
}

/// Color `text` when writing to a terminal.
pub fn tint(text: &str, color: Color, styled: bool) -> String {
    if styled {
        text.with(color).to_string()
    } else {
        text.to_string()
    }
}

pub struct Panel<'a> {
    title: &'a str,
    body: &'a str,
    width: usize,
}

impl<'a> Panel<'a> {
    pub fn new(title: &'a str, body: &'a str) -> Self {
        Panel {
            title,
            body,
            width: DEFAULT_WIDTH,
        }
    }

    pub fn width(mut self, width: usize) -> Self {
        self.width = width.max(MIN_WIDTH);
        self
    }

    /// Draw the panel. ANSI styling is only emitted when `styled` is set.
    pub fn render(&self, styled: bool) -> String {
        let inner = self.width - 2;
        let text_width = inner - 2 * PAD_X;
        let paint = |s: String| -> String {
            if styled {
                s.with(BORDER).to_string()
            } else {
                s
            }
        };

        let title = format!(" {} ", self.title);
        let title_len = display_width(&title).min(inner.saturating_sub(1));
        let top_rule = "─".repeat(inner - 1 - title_len);
        let title = if styled {
            title.bold().with(BORDER).to_string()
        } else {
            title
        };
        let mut out = format!("{}{}{}\n", paint("╭─".to_string()), title, paint(format!("{top_rule}╮")));

        let blank = format!("{}{}{}\n", paint("│".to_string()), " ".repeat(inner), paint("│".to_string()));
        out.push_str(&blank);
        for line in self.body.trim_end().lines() {
            let wrapped = textwrap::wrap(line, text_width);
            if wrapped.is_empty() {
                out.push_str(&blank);
                continue;
            }
            for piece in wrapped {
                let fill = text_width.saturating_sub(display_width(&piece));
                out.push_str(&format!(
                    "{}{}{}{}{}{}\n",
                    paint("│".to_string()),
                    " ".repeat(PAD_X),
                    piece,
                    " ".repeat(fill),
                    " ".repeat(PAD_X),
                    paint("│".to_string()),
                ));
            }
        }
        out.push_str(&blank);
        out.push_str(&paint(format!("╰{}╯", "─".repeat(inner))));
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_panel_has_even_borders() {
        let out = Panel::new("Agent", "The service restarted twice.")
            .width(40)
            .render(false);
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("╭─ Agent "));
        assert!(lines.last().unwrap().starts_with('╰'));
        for line in &lines {
            assert_eq!(display_width(line), 40, "line {:?}", line);
        }
        assert!(out.contains("│  The service restarted twice."));
    }

    #[test]
    fn long_lines_wrap_inside_panel() {
        let body = "word ".repeat(30);
        let out = Panel::new("Agent", &body).width(40).render(false);
        assert!(out.lines().count() > 5);
        assert!(out.lines().all(|l| display_width(l) == 40));
    }

    #[test]
    fn blank_body_lines_are_kept() {
        let out = Panel::new("Agent", "first\n\nsecond").width(40).render(false);
        let lines: Vec<&str> = out.lines().collect();
        // top, padding, first, blank, second, padding, bottom
        assert_eq!(lines.len(), 7);
        assert!(lines[3].trim_matches('│').trim().is_empty());
    }

    #[test]
    fn styled_output_contains_escape_codes() {
        let out = Panel::new("Agent", "hi").render(true);
        assert!(out.contains('\u{1b}'));
    }
}
