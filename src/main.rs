// Terminal REPL over one Claude session
//
// Each line typed runs one turn. Permission prompts are answered with y/n;
// `/stop` ends the session and `/quit` exits.
//
// Usage: kodegen-claude-session [--dangerous] [--cwd <dir>] [--model <name>]

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use kodegen_claude_session::{
    AgentSession, DiagnosticLevel, SessionEvent, SessionOptions, SessionState,
};
use tokio::io::{AsyncBufReadExt, BufReader};

struct Args {
    dangerous: bool,
    cwd: Option<PathBuf>,
    model: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        dangerous: false,
        cwd: None,
        model: None,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--dangerous" => args.dangerous = true,
            "--cwd" => args.cwd = Some(iter.next().context("--cwd needs a directory")?.into()),
            "--model" => args.model = Some(iter.next().context("--model needs a name")?),
            other => bail!("Unknown argument: {other}"),
        }
    }
    Ok(args)
}

fn prompt(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = parse_args()?;
    let mut builder = SessionOptions::builder();
    if let Some(cwd) = args.cwd {
        builder = builder.cwd(cwd);
    }
    if let Some(model) = args.model {
        builder = builder.model(model);
    }

    let mut session = AgentSession::new(builder.build())?;
    let mut events = session
        .take_event_receiver()
        .context("event receiver already taken")?;

    if !session.check_availability().await {
        bail!("The claude CLI is not installed or not on PATH");
    }
    session.start(args.dangerous)?;

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    prompt("> ");

    loop {
        tokio::select! {
            line = input.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();

                match line {
                    "" => {}
                    "/quit" => break,
                    "/stop" => {
                        session.stop().await?;
                        println!("(session stopped, type anything to restart)");
                    }
                    _ if session.pending_permission().is_some() => {
                        if line.eq_ignore_ascii_case("y") {
                            session.allow()?;
                        } else {
                            session.deny(None)?;
                        }
                    }
                    text => {
                        if session.state().can_start() {
                            session.start(args.dangerous)?;
                        }
                        if let Err(e) = session.send_message(text).await {
                            eprintln!("{e}");
                            prompt("> ");
                        }
                    }
                }
            }
            Some(event) = events.recv() => match event {
                SessionEvent::TextDelta { text } => prompt(&text),
                SessionEvent::ThinkingDelta { .. } => {}
                SessionEvent::PermissionRequested(request) => {
                    println!();
                    println!("{} wants to run with {}", request.tool_name, request.input);
                    prompt("Allow? [y/N] ");
                }
                SessionEvent::TurnCompleted(summary) => {
                    println!(
                        "\n[{} turn(s), ${:.4} total]",
                        summary.stats.results, summary.stats.total_cost_usd
                    );
                    prompt("> ");
                }
                SessionEvent::Diagnostic { level: DiagnosticLevel::Error, message } => {
                    eprintln!("\nerror: {message}");
                }
                SessionEvent::InactivityTimeout { idle } => {
                    eprintln!("\n(no output for {}s, /stop to abort)", idle.as_secs());
                }
                SessionEvent::StateChanged { to: SessionState::Error, .. } => prompt("> "),
                _ => {}
            },
        }
    }

    session.stop().await?;
    Ok(())
}
