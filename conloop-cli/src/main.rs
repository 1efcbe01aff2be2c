use anyhow::{Context, Result};
use clap::Parser;
use conloop::{DispatchOutcome, Level};
use conloop_cli::{CliArgs, Console, TerminalShell, TerminalSink};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    conloop::init_subscriber_with_config(args.tracing_config())
        .context("Failed to initialize tracing")?;

    let console = Console::new(
        args.console_config(),
        Arc::new(TerminalSink::new()),
        Arc::new(TerminalShell::new()),
    )
    .context("Failed to start console")?;

    if let Some(name) = &args.scaffold {
        let path = console.write_starter_plugin(name)?;
        println!("Wrote starter plugin {}", path.display());
        return Ok(());
    }

    let loading = console.start();

    if args.exec.is_empty() {
        return repl(&console).await;
    }

    // Batch mode waits for the initial load so plugin commands resolve.
    if let Some(handle) = loading {
        handle.await.context("Plugin loading task failed")?;
    }
    run_batch(&console, &args.exec)
}

fn run_batch(console: &Console, lines: &[String]) -> Result<()> {
    let mut failed = 0;
    for line in lines {
        console.api().log(&format!("> {}", line), Level::Plain);
        match console.execute(line) {
            DispatchOutcome::Executed { .. } | DispatchOutcome::Empty => {}
            _ => failed += 1,
        }
        if console.is_closed() {
            break;
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} command lines failed", failed, lines.len());
    }
    Ok(())
}

async fn repl(console: &Console) -> Result<()> {
    console
        .api()
        .log("Type 'help' for a full list of available commands.", Level::Info);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while !console.is_closed() {
        prompt()?;
        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        console.execute(&line);
    }
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    write!(out, "> ")?;
    out.flush()
}
