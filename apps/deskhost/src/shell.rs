//! Console main loop: a line-oriented stand-in for the desktop window.

use anyhow::Context;
use deskkit::{
    AppInfo, ExportModule, ExportSet, Injectable, PortSelection, ServiceScope, UiContext, UiEntry,
};
use std::{
    io::{BufRead, Write},
    sync::{Arc, mpsc},
    time::Duration,
};

const POLL: Duration = Duration::from_millis(200);

const HELP: &str = "\
commands:
  start [port]  start (or restart) the endpoint
  stop          stop the endpoint
  status        show the current endpoint
  help          show this text
  quit          exit";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Start(Option<u16>),
    Stop,
    Status,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Command::Empty;
        };
        match (verb.to_ascii_lowercase().as_str(), words.next(), words.next()) {
            ("start" | "restart", None, None) => Command::Start(None),
            ("start" | "restart", Some(port), None) => match port.parse() {
                Ok(port) => Command::Start(Some(port)),
                Err(_) => Command::Unknown(line.trim().to_owned()),
            },
            ("stop", None, None) => Command::Stop,
            ("status", None, None) => Command::Status,
            ("help" | "?", None, None) => Command::Help,
            ("quit" | "exit", None, None) => Command::Quit,
            _ => Command::Unknown(line.trim().to_owned()),
        }
    }
}

/// The `console` UI entry.
pub struct ConsoleShell {
    info: Arc<AppInfo>,
}

impl Injectable for ConsoleShell {
    fn inject(scope: &ServiceScope) -> anyhow::Result<Self> {
        Ok(Self {
            info: scope.resolve::<AppInfo>()?,
        })
    }
}

impl UiEntry for ConsoleShell {
    fn run(&self, ctx: &UiContext) -> anyhow::Result<()> {
        let lines = spawn_reader()?;
        let mut out = std::io::stdout();
        writeln!(out, "{} (type 'help' for commands)", self.info.title_version())?;
        print_status(ctx, &mut out)?;

        loop {
            if ctx.shutdown().is_cancelled() {
                tracing::info!("Shutdown requested; leaving console");
                break;
            }
            let line = match lines.recv_timeout(POLL) {
                Ok(line) => line,
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            };
            match Command::parse(&line) {
                Command::Start(port) => {
                    let selection = port.map_or_else(|| ctx.port_selection(), PortSelection::Explicit);
                    match ctx.block_on(ctx.host().start(selection, ctx.shutdown().child_token())) {
                        Ok(endpoint) => writeln!(out, "Listening on {}", endpoint.url())?,
                        Err(e) => writeln!(out, "Start failed: {:#}", anyhow::Error::new(e))?,
                    }
                }
                Command::Stop => {
                    ctx.block_on(ctx.host().stop());
                    writeln!(out, "Stopped")?;
                }
                Command::Status => print_status(ctx, &mut out)?,
                Command::Help => writeln!(out, "{HELP}")?,
                Command::Quit => break,
                Command::Empty => {}
                Command::Unknown(text) => writeln!(out, "Unknown command: {text}")?,
            }
            out.flush()?;
        }
        Ok(())
    }
}

fn print_status(ctx: &UiContext, out: &mut impl Write) -> std::io::Result<()> {
    match ctx.host().current() {
        Some(endpoint) => writeln!(out, "Endpoint {} [{}]", endpoint.url(), endpoint.status()),
        None => writeln!(out, "Endpoint stopped"),
    }
}

/// Reads stdin on its own thread so the loop can keep watching for shutdown.
fn spawn_reader() -> anyhow::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("console-stdin".to_owned())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("failed to spawn console reader")?;
    Ok(rx)
}

fn exports(set: &mut ExportSet) {
    set.entry::<ConsoleShell>("console");
}

inventory::submit! {
    ExportModule::builtin("shell", exports)
}
