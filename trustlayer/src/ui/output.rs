//! Status messages on stderr, coloured when stderr is a terminal.

use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use std::io::{self, Write};

fn write_tagged(tag: &str, msg: &str, paint: fn(&str) -> String) {
    let mut stderr = io::stderr();
    let line = if stderr.is_terminal() {
        format!("{} {}", paint(tag), msg)
    } else {
        format!("{} {}", tag, msg)
    };
    let _ = writeln!(stderr, "{}", line);
}

pub fn info_msg(msg: impl AsRef<str>) {
    write_tagged("[info]", msg.as_ref(), |t| t.cyan().to_string());
}

pub fn warn_msg(msg: impl AsRef<str>) {
    write_tagged("[warn]", msg.as_ref(), |t| t.yellow().to_string());
}

pub fn error_msg(msg: impl AsRef<str>) {
    write_tagged("[error]", msg.as_ref(), |t| t.red().bold().to_string());
}
