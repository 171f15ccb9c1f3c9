//! Log line rendering
//!
//! Terraform and most build tools color their output. The raw escape codes
//! are kept in the stream; `--plain` strips them at display time.

use colored::*;
use runlog_core::domain::log::{LogRecord, group_by_step};
use runlog_core::domain::stream::Offset;

const ESC: char = '\u{1b}';
const BEL: char = '\u{07}';

/// Remove ANSI escape sequences (CSI, OSC and two-character escapes)
pub fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != ESC {
            out.push(c);
            continue;
        }

        match chars.next() {
            // CSI: parameters and intermediates, then one final byte in @..~
            Some('[') => {
                for c in chars.by_ref() {
                    if ('@'..='~').contains(&c) {
                        break;
                    }
                }
            }
            // OSC: terminated by BEL or ESC \
            Some(']') => {
                while let Some(c) = chars.next() {
                    if c == BEL {
                        break;
                    }
                    if c == ESC && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    out
}

fn render(output: &str, plain: bool) -> String {
    if plain {
        strip_ansi(output)
    } else {
        output.to_string()
    }
}

/// Print one entry as `offset [step] output`
pub fn print_entry(offset: Offset, record: &LogRecord, plain: bool) {
    println!(
        "{:>6} {} {}",
        offset.to_string().dimmed(),
        format!("[{}]", record.step_id).cyan(),
        render(&record.output, plain)
    );
}

/// Print records regrouped by step, each step sorted by line number
pub fn print_by_step<'a>(records: impl IntoIterator<Item = &'a LogRecord>, plain: bool) {
    for step in group_by_step(records) {
        println!("{}", format!("── {} ──", step.step_id).bold());
        for line in step.lines {
            println!(
                "{:>5} {}",
                line.line_number.to_string().dimmed(),
                render(&line.output, plain)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_color_codes() {
        let colored = "\u{1b}[1m\u{1b}[32mApply complete!\u{1b}[0m Resources: 1 added";
        assert_eq!(strip_ansi(colored), "Apply complete! Resources: 1 added");
    }

    #[test]
    fn test_strip_osc_hyperlink() {
        let link = "see \u{1b}]8;;https://example.com\u{07}docs\u{1b}]8;;\u{1b}\\ now";
        assert_eq!(strip_ansi(link), "see docs now");
    }

    #[test]
    fn test_plain_text_is_untouched() {
        assert_eq!(strip_ansi("Plan: 0 to add [x]"), "Plan: 0 to add [x]");
        assert_eq!(strip_ansi(""), "");
    }

    #[test]
    fn test_truncated_sequence_is_dropped() {
        assert_eq!(strip_ansi("done\u{1b}[3"), "done");
    }
}
