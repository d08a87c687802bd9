//! Interactive loop: read a line, submit it, print the reply or question.
//!
//! Exits on EOF or `quit`/`exit`/`/quit`. `/reset` clears the session.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};

use dossier_agent::prelude::*;

fn is_quit_command(line: &str) -> bool {
    matches!(line.trim(), "quit" | "exit" | "/quit" | "/exit")
}

pub fn print_outcome(outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Answer { text, .. } => println!("{text}"),
        TurnOutcome::Clarification(request) => println!("? {}", request.question),
    }
}

pub async fn run(agent: &ResearchAgent, session: &str) -> anyhow::Result<()> {
    let mut reader = BufReader::new(tokio::io::stdin()).lines();
    println!("session {session}; ask about a company (quit to exit)");

    if let Some(request) = agent.pending(session).await? {
        println!("? {}", request.question);
    }

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = match reader.next_line().await? {
            None => break,
            Some(s) if s.trim().is_empty() => continue,
            Some(s) if is_quit_command(&s) => break,
            Some(s) => s,
        };

        if line.trim() == "/reset" {
            agent.reset(session).await?;
            println!("session reset");
            continue;
        }

        match agent.submit(session, &line).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}
