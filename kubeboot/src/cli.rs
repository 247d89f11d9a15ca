use anstyle::{AnsiColor, Color, Style};
use clap::builder::Styles;

/// Styles for CLI
pub fn get_styles() -> Styles {
  Styles::styled()
    .header(
      Style::new()
        .bold()
        .underline()
        .fg_color(Some(Color::Ansi(AnsiColor::Green))),
    )
    .literal(Style::new().bold().fg_color(Some(Color::Ansi(AnsiColor::BrightCyan))))
    .usage(
      Style::new()
        .bold()
        .fg_color(Some(Color::Ansi(AnsiColor::Green))),
    )
    .placeholder(
      Style::new()
        .bold()
        .underline()
        .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
    )
}
