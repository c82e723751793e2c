//! # Completions Command Implementation
//!
//! Generates shell completion scripts with `clap_complete`, covering every
//! subcommand and flag (including distribution-independent ones such as
//! `--vmid-base`).
//!
//! ```bash
//! pve-templates completions bash > ~/.local/share/bash-completion/completions/pve-templates
//! pve-templates completions zsh --output ~/.zfunc/_pve-templates
//! ```

use anyhow::{Context, Result};
use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};
use std::io::{self, Write};
use std::path::PathBuf;

use crate::cli::Cli;

const BIN_NAME: &str = "pve-templates";

/// Generate shell completion scripts
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// The shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,

    /// Write the script to FILE instead of stdout
    #[arg(long, short, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Completion script for `shell`.
fn render(shell: Shell) -> Vec<u8> {
    let mut cmd = Cli::command();
    let mut buffer = Vec::new();
    generate(shell, &mut cmd, BIN_NAME, &mut buffer);
    buffer
}

/// Execute the `completions` command.
pub fn execute(args: CompletionsArgs) -> Result<()> {
    let script = render(args.shell);
    match &args.output {
        Some(path) => std::fs::write(path, &script)
            .with_context(|| format!("Failed to write completions to {}", path.display()))?,
        None => io::stdout().write_all(&script)?,
    }
    Ok(())
}
