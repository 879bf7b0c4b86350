//! Shell completions.

use std::io::Write;

use anyhow::Result;
use clap::CommandFactory as _;
use clap_complete::Shell;

use crate::cli::Cli;

pub fn generate_completions(shell: Shell) -> Result<()> {
    let mut stdout = std::io::stdout();
    write_completions(shell, &mut stdout);
    stdout.flush()?;
    Ok(())
}

fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_owned();
    clap_complete::generate(shell, &mut cmd, bin_name, out);
}
