use anyhow::{Context, Result};
use std::io::{self, Write};
use tracing::error;

use crate::session::{CommandOutcome, Session, SessionEvent};

pub const INSTRUCTION: &str = r"
=== Instruction ===
Chat with LLM about papers!

1. Input 'Quit' to exit / Input 'Clear' to clear history.
2. Input 'arxiv:<arxiv_paper_id>', e.g. 'arxiv:2311.11100', to download and chat about the paper.
3. Input 'file:<your_file_path>', e.g. 'file:files/HowtoReadPaper.pdf', to upload and chat about the paper.
4. Input 'delete:<arxiv_paper_id/file_name>', e.g. 'delete:2311.11100.pdf' or 'delete:HowtoReadPaper.pdf', to delete the paper.
5. Input 'load-log:<file_name>' , e.g. 'load-log:2024-08-19_15-56-26', to load the chat history.
6. It may take a while to download/upload the paper.

=== Instruction End ===
";

pub async fn run_repl(mut session: Session) -> Result<()> {
    println!("{INSTRUCTION}");

    loop {
        print!("HUMAN: ");
        io::stdout().flush().context("Failed to flush stdout")?;

        let mut input = String::new();
        let read = io::stdin()
            .read_line(&mut input)
            .context("Failed to read stdin")?;
        if read == 0 {
            break;
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        let mut step = 0usize;
        let mut sink = |event: SessionEvent| print_event(event, &mut step);
        let result = session.handle(line, &mut sink).await;
        match result {
            Ok(CommandOutcome::Quit) => break,
            Ok(outcome) => print_outcome(&outcome, session.log_name()),
            Err(err) => {
                error!(error = %format!("{err:#}"), "command failed");
                eprintln!("\nError: {err:#}\n");
            }
        }
    }

    Ok(())
}

fn print_event(event: SessionEvent, step: &mut usize) {
    match event {
        SessionEvent::Step(msg) => {
            *step += 1;
            println!("[STEP {step}]: {msg}");
        }
        SessionEvent::ResponseStarted => println!("\n=== Model Response Start ===\n"),
        SessionEvent::Fragment { fragment, .. } => {
            print!("{fragment}");
            let _ = io::stdout().flush();
        }
        SessionEvent::ResponseFinished => println!("\n\n=== Model Response End ===\n"),
        SessionEvent::Notice(msg) => println!("{msg}"),
    }
}

fn print_outcome(outcome: &CommandOutcome, log_name: &str) {
    match outcome {
        CommandOutcome::Attached(handle) => {
            println!("\n=== Uploading file id: {handle} Finished ===\n");
        }
        CommandOutcome::Detached(Some(handle)) => {
            println!("\n=== Deleting file id: {handle} Finished ===\n");
        }
        CommandOutcome::LoadedLog(name) => {
            println!("\n=== Loading log: {name}.log Finished ===\n");
        }
        CommandOutcome::Cleared => println!("new log: {log_name}\n"),
        CommandOutcome::Quit
        | CommandOutcome::Detached(None)
        | CommandOutcome::Answered(_)
        | CommandOutcome::Rejected(_) => {}
    }
}
