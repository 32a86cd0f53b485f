//! Shared command-line presentation for the workspace binaries.

use clap::builder::{
	Styles,
	styling::{AnsiColor, Effects},
};

/// Package version reported by `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn styles() -> Styles {
	let heading = AnsiColor::Magenta.on_default() | Effects::BOLD;

	Styles::styled()
		.header(heading)
		.usage(heading)
		.literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
		.error(AnsiColor::Red.on_default() | Effects::BOLD)
		.valid(AnsiColor::Green.on_default() | Effects::BOLD)
		.invalid(AnsiColor::Yellow.on_default() | Effects::BOLD)
}
