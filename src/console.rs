//! Console channel: reads lines from stdin, runs chat turns, streams the
//! reply to stdout.
//!
//! Lines starting with `/` are commands (see [`HELP`]); anything else is a
//! chat message. Runs until `/quit`, EOF on stdin, or the `shutdown` token is
//! cancelled (Ctrl-C). Every [`ChatError`] is printed as a one-line banner and
//! the loop carries on.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::ChatSession;
use crate::error::{AppError, ChatError};
use crate::llm::stream::DisplaySink;
use crate::session::export::write_exports;
use crate::session::transcript::SUPPORTED_MODELS;

pub const HELP: &str = "\
commands:
  /help              show this list
  /new, /reset       start a new chat (system prompt and settings are kept)
  /system [text]     show or replace the system prompt
  /model [id]        show supported models or switch model
  /temp <0.0-2.0>    set temperature
  /max <128-8192>    set max output tokens
  /show              current settings
  /history           conversation so far
  /export            write JSON and CSV exports
  /health            check the active backend
  /start             launch the bridge browser (bridge backend only)
  /retry             regenerate the last reply (bridge backend only)
  /chats             list the bridge's conversations
  /select <id>       switch the bridge to another conversation
  /gpts              list the bridge's models
  /quit              leave";

/// Where `/export` writes its files.
#[derive(Debug, Clone)]
pub struct ConsoleOptions {
    pub export_dir: PathBuf,
    pub export_name: String,
}

// ── Commands ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Say(String),
    Help,
    New,
    System(Option<String>),
    Model(Option<String>),
    Temperature(f32),
    MaxTokens(u32),
    Show,
    History,
    Export,
    Health,
    Start,
    Retry,
    Chats,
    SelectChat(String),
    Gpts,
    Quit,
    /// A known command with an unusable argument; carries the reason.
    Invalid(String),
    Unknown(String),
}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Command::Say(line.to_string()));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (rest, None),
        };

        let cmd = match name {
            "help" | "?" => Command::Help,
            "new" | "reset" => Command::New,
            "system" => Command::System(arg.map(str::to_string)),
            "model" => Command::Model(arg.map(str::to_string)),
            "temp" | "temperature" => match arg.map(str::parse::<f32>) {
                Some(Ok(t)) => Command::Temperature(t),
                _ => Command::Invalid("usage: /temp <0.0-2.0>".into()),
            },
            "max" | "max_tokens" => match arg.map(str::parse::<u32>) {
                Some(Ok(n)) => Command::MaxTokens(n),
                _ => Command::Invalid("usage: /max <128-8192>".into()),
            },
            "show" => Command::Show,
            "history" => Command::History,
            "export" => Command::Export,
            "health" => Command::Health,
            "start" => Command::Start,
            "retry" => Command::Retry,
            "chats" => Command::Chats,
            "select" => match arg {
                Some(id) => Command::SelectChat(id.to_string()),
                None => Command::Invalid("usage: /select <chat id>".into()),
            },
            "gpts" => Command::Gpts,
            "quit" | "exit" | "q" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        };
        Some(cmd)
    }
}

// ── Output ────────────────────────────────────────────────────────────────────

/// Prints only the newly arrived tail of the reply each time it grows.
#[derive(Debug, Default)]
pub struct StdoutSink {
    printed: usize,
}

impl DisplaySink for StdoutSink {
    fn render(&mut self, full: &str) {
        let tail = full.get(self.printed..).unwrap_or(full);
        print!("{tail}");
        let _ = std::io::stdout().flush();
        self.printed = full.len();
    }
}

/// Print the optional banner file. A missing or unreadable file is skipped.
pub fn print_banner(path: Option<&Path>) {
    let Some(path) = path else { return };
    match std::fs::read_to_string(path) {
        Ok(text) => println!("{}", text.trim_end()),
        Err(e) => debug!(path = %path.display(), error = %e, "banner skipped"),
    }
}

fn print_error(e: &ChatError) {
    println!("[!] {e}");
}

// ── Loop ──────────────────────────────────────────────────────────────────────

enum Flow {
    Continue,
    Quit,
}

pub async fn run(
    mut session: ChatSession,
    options: ConsoleOptions,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    info!(
        run_id = %session.transcript().run_id(),
        backend = ?session.providers().labels(),
        "console started"
    );
    println!("─────────────────────────────────────────");
    println!(" PRIMUS chat  (/help for commands, Ctrl-C to quit)");
    println!("─────────────────────────────────────────");

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let line = tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                println!();
                info!("shutdown signal received, closing console");
                break;
            }

            line = lines.next_line() => match line {
                Err(e) => {
                    warn!("stdin read error: {e}");
                    break;
                }
                Ok(None) => {
                    info!("stdin closed");
                    break;
                }
                Ok(Some(line)) => line,
            }
        };

        let Some(cmd) = Command::parse(&line) else { continue };
        debug!(?cmd, "console command");

        if let Flow::Quit = dispatch(&mut session, cmd, &options, &shutdown).await {
            break;
        }
    }

    info!(run_id = %session.transcript().run_id(), messages = session.transcript().len(), "console closed");
    Ok(())
}

/// Run one command to completion. A Ctrl-C that arrives meanwhile does not
/// abort the request; the console stops once the turn is over.
async fn dispatch(
    session: &mut ChatSession,
    cmd: Command,
    options: &ConsoleOptions,
    shutdown: &CancellationToken,
) -> Flow {
    let flow = handle(session, cmd, options).await;
    if shutdown.is_cancelled() {
        println!("[interrupted]");
        info!("shutdown signal received during a turn, closing console");
        return Flow::Quit;
    }
    flow
}

async fn handle(session: &mut ChatSession, cmd: Command, options: &ConsoleOptions) -> Flow {
    match cmd {
        Command::Say(text) => {
            let mut sink = StdoutSink::default();
            match session.submit(&text, &mut sink).await {
                Ok(reply) => {
                    // A one-piece reply, or the placeholder, was never streamed.
                    if sink.printed == 0 {
                        print!("{}", reply.content);
                    }
                    println!();
                }
                Err(e) => {
                    if sink.printed > 0 {
                        println!();
                    }
                    print_error(&e);
                }
            }
        }
        Command::Help => println!("{HELP}"),
        Command::New => {
            session.new_chat().await;
            println!("new chat: {}", session.transcript().run_id());
        }
        Command::System(None) => {
            println!("{}", session.transcript().system_prompt().unwrap_or("(none)"));
        }
        Command::System(Some(text)) => match session.set_system_prompt(&text) {
            Ok(()) => println!("system prompt updated"),
            Err(e) => print_error(&e),
        },
        Command::Model(None) => {
            let current = session.transcript().parameters().model().to_string();
            for m in SUPPORTED_MODELS {
                let mark = if *m == current { "*" } else { " " };
                println!(" {mark} {m}");
            }
        }
        Command::Model(Some(id)) => match session.parameters_mut().set_model(id) {
            Ok(()) => println!("model: {}", session.transcript().parameters().model()),
            Err(e) => print_error(&e),
        },
        Command::Temperature(t) => match session.parameters_mut().set_temperature(t) {
            Ok(()) => println!("temperature: {t}"),
            Err(e) => print_error(&e),
        },
        Command::MaxTokens(n) => match session.parameters_mut().set_max_output_tokens(n) {
            Ok(()) => println!("max tokens: {n}"),
            Err(e) => print_error(&e),
        },
        Command::Show => {
            let t = session.transcript();
            let p = t.parameters();
            println!("run id:      {}", t.run_id());
            println!("backend:     {}", session.providers().labels().join(" -> "));
            println!("model:       {}", p.model());
            println!("temperature: {}", p.temperature());
            println!("max tokens:  {}", p.max_output_tokens());
            println!("messages:    {}", t.len());
            println!("system:      {}", t.system_prompt().unwrap_or("(none)"));
        }
        Command::History => {
            let mut any = false;
            for m in session.transcript().turns() {
                any = true;
                println!("{:>9}: {}", m.role.as_str(), m.content);
            }
            if !any {
                println!("(no messages yet)");
            }
        }
        Command::Export => {
            match write_exports(session.transcript(), &options.export_dir, &options.export_name) {
                Ok((json, csv)) => {
                    println!("exported {}", json.display());
                    println!("exported {}", csv.display());
                }
                Err(e) => println!("[!] {e}"),
            }
        }
        Command::Health => match session.providers().primary().ping().await {
            Ok(status) => println!("{status}"),
            Err(e) => print_error(&ChatError::from(e)),
        },
        Command::Start => match session.start_bridge().await {
            Ok(status) => println!("{status}"),
            Err(e) => print_error(&e),
        },
        Command::Retry => match session.retry().await {
            Ok(reply) => println!("{}", reply.content),
            Err(e) => print_error(&e),
        },
        Command::Chats => match session.chat_list().await {
            Ok(chats) => print_list(&chats, "(no chats)"),
            Err(e) => print_error(&e),
        },
        Command::SelectChat(id) => match session.select_chat(&id).await {
            Ok(status) => println!("{status}"),
            Err(e) => print_error(&e),
        },
        Command::Gpts => match session.gpt_list().await {
            Ok(models) => print_list(&models, "(no models)"),
            Err(e) => print_error(&e),
        },
        Command::Quit => return Flow::Quit,
        Command::Invalid(usage) => println!("{usage}"),
        Command::Unknown(name) => println!("unknown command '/{name}', try /help"),
    }
    Flow::Continue
}

fn print_list(items: &[String], empty: &str) {
    if items.is_empty() {
        println!("{empty}");
    }
    for (i, item) in items.iter().enumerate() {
        println!("{i:>3}. {item}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(Command::parse("  hello there \n"), Some(Command::Say("hello there".into())));
        assert_eq!(Command::parse("   "), None);
    }

    #[test]
    fn commands_with_arguments() {
        assert_eq!(
            Command::parse("/system  be terse "),
            Some(Command::System(Some("be terse".into())))
        );
        assert_eq!(Command::parse("/system"), Some(Command::System(None)));
        assert_eq!(Command::parse("/model gpt-4o"), Some(Command::Model(Some("gpt-4o".into()))));
        assert_eq!(Command::parse("/temp 0.2"), Some(Command::Temperature(0.2)));
        assert_eq!(Command::parse("/max 2048"), Some(Command::MaxTokens(2048)));
    }

    #[test]
    fn aliases() {
        assert_eq!(Command::parse("/reset"), Some(Command::New));
        assert_eq!(Command::parse("/new"), Some(Command::New));
        assert_eq!(Command::parse("/exit"), Some(Command::Quit));
    }

    #[test]
    fn bad_arguments_are_invalid() {
        assert!(matches!(Command::parse("/temp hot"), Some(Command::Invalid(_))));
        assert!(matches!(Command::parse("/max"), Some(Command::Invalid(_))));
        assert!(matches!(Command::parse("/max -5"), Some(Command::Invalid(_))));
    }

    #[test]
    fn bridge_commands() {
        assert_eq!(Command::parse("/retry"), Some(Command::Retry));
        assert_eq!(Command::parse("/chats"), Some(Command::Chats));
        assert_eq!(Command::parse("/gpts"), Some(Command::Gpts));
        assert_eq!(Command::parse("/select  c-42 "), Some(Command::SelectChat("c-42".into())));
        assert_eq!(
            Command::parse("/select"),
            Some(Command::Invalid("usage: /select <chat id>".into()))
        );
    }

    #[test]
    fn unknown_command_keeps_name() {
        assert_eq!(Command::parse("/frobnicate now"), Some(Command::Unknown("frobnicate".into())));
    }

    #[test]
    fn stdout_sink_tracks_printed_length() {
        let mut sink = StdoutSink::default();
        sink.render("Hel");
        sink.render("Hello");
        assert_eq!(sink.printed, 5);
    }

    fn dummy_session() -> ChatSession {
        use crate::llm::LlmProvider;
        use crate::llm::chain::ProviderChain;
        use crate::llm::providers::dummy::DummyProvider;
        use crate::session::{Parameters, Transcript};

        let t = Transcript::initialize("be brief", Parameters::default());
        ChatSession::new(t, ProviderChain::single(LlmProvider::Dummy(DummyProvider)), true)
    }

    fn options() -> ConsoleOptions {
        ConsoleOptions { export_dir: PathBuf::from("exports"), export_name: "primus_chat".into() }
    }

    #[tokio::test]
    async fn interrupt_during_turn_lets_it_finish_then_quits() {
        let mut session = dummy_session();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let flow = dispatch(&mut session, Command::Say("still there?".into()), &options(), &shutdown).await;
        assert!(matches!(flow, Flow::Quit));
        let last = session.transcript().messages().last().unwrap();
        assert_eq!(last.content, "[echo] still there?");
        assert_eq!(session.transcript().len(), 3);
    }

    #[tokio::test]
    async fn turn_without_interrupt_continues() {
        let mut session = dummy_session();
        let flow = dispatch(&mut session, Command::Say("hi".into()), &options(), &CancellationToken::new()).await;
        assert!(matches!(flow, Flow::Continue));
        assert_eq!(session.transcript().len(), 3);
    }

    #[test]
    fn missing_banner_is_skipped() {
        print_banner(Some(Path::new("/nonexistent/banner.txt")));
        print_banner(None);
    }
}
