//! An interactive terminal chat backed by an MCP server.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use toolchat::core::ContextSelector;
use toolchat::{ChatSession, ChatSessionBuilder, Settings};
use toolchat_anthropic_model::AnthropicProvider;
use toolchat_mcp_provider::McpProvider;

const BAR_CHAR: &str = "▎";

const HELP: &str = "\
Commands:
  /client <id> <name>  select the client the conversation is about
  /clear-client        forget the selected client
  /tools               list the tools of the MCP server
  /help                show this message
  /quit                leave";

enum Command<'a> {
    Message(&'a str),
    SelectClient(ContextSelector),
    ClearClient,
    Tools,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Command<'_>, &'static str> {
    let Some(command) = line.strip_prefix('/') else {
        return Ok(Command::Message(line));
    };
    let mut parts = command.splitn(3, char::is_whitespace);
    match parts.next().unwrap_or_default() {
        "client" => {
            let id = parts.next().filter(|id| !id.is_empty());
            let name = parts.next().map(str::trim).filter(|name| !name.is_empty());
            match (id, name) {
                (Some(id), Some(name)) => {
                    Ok(Command::SelectClient(ContextSelector::new(id, name)))
                }
                _ => Err("usage: /client <id> <name>"),
            }
        }
        "clear-client" => Ok(Command::ClearClient),
        "tools" => Ok(Command::Tools),
        "help" => Ok(Command::Help),
        "quit" => Ok(Command::Quit),
        _ => Err("unknown command, try /help"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };
    debug!("settings: {settings:?}");
    let mcp_config = match settings.mcp_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };

    let model_provider = AnthropicProvider::new(settings.anthropic_config());
    let tool_provider = McpProvider::new(mcp_config);
    let mut builder =
        ChatSessionBuilder::with_providers(model_provider, tool_provider);
    if let Some(rounds) = settings.max_tool_rounds() {
        builder = builder.with_max_tool_rounds(rounds);
    }
    let mut session = builder.build();

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    println!("{}", HELP.dimmed());
    loop {
        match session.client() {
            Some(client) => print!("{} > ", client.name.bright_magenta()),
            None => print!("> "),
        }
        _ = std::io::stdout().flush();

        let Some(line) = read_line().await else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match parse_command(line) {
            Ok(command) => command,
            Err(usage) => {
                println!("{}", usage.yellow());
                continue;
            }
        };
        match command {
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::SelectClient(client) => {
                println!("Talking about {} now.", client.name.bold());
                session.select_client(client);
            }
            Command::ClearClient => {
                session.clear_client();
                println!("No client selected.");
            }
            Command::Tools => {
                let progress_bar = spinner(&progress_style, "🔌 Connecting...");
                let tools = session.tools().await;
                progress_bar.finish_and_clear();
                match tools {
                    Ok(tools) => print_tools(&tools),
                    Err(err) => print_error(&err),
                }
            }
            Command::Message(message) => {
                send_message(&mut session, message, &progress_style).await;
            }
        }
    }
}

async fn send_message(
    session: &mut ChatSession,
    message: &str,
    progress_style: &ProgressStyle,
) {
    let progress_bar = spinner(progress_style, "🤔 Thinking...");
    let result = session.send_message(message).await;
    progress_bar.finish_and_clear();

    match result {
        Ok(outcome) => {
            let bar = BAR_CHAR.bright_cyan();
            for line in outcome.text.lines() {
                if line.starts_with("[Tool ") {
                    println!("{bar}{}", line.dimmed());
                } else {
                    println!("{bar}{}", line.bright_white());
                }
            }
            if outcome.tool_rounds_exhausted {
                println!(
                    "{}⚠️  Stopped calling tools after {} rounds.",
                    BAR_CHAR.bright_yellow(),
                    session.max_tool_rounds()
                );
            }
        }
        Err(err) => print_error(&err),
    }
}

fn spinner(style: &ProgressStyle, message: &'static str) -> ProgressBar {
    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(style.clone());
    progress_bar.set_message(message);
    progress_bar.enable_steady_tick(Duration::from_millis(100));
    progress_bar
}

fn print_tools(tools: &[toolchat_tool_provider::ToolDescriptor]) {
    if tools.is_empty() {
        println!("The server offers no tools.");
        return;
    }
    for tool in tools {
        let description = tool.description.as_deref().unwrap_or_default();
        println!("{} {}", tool.name.bold(), description.dimmed());
    }
}

fn print_error(err: &toolchat::core::Error) {
    error!("{err}");
    println!("{}❌ {}", BAR_CHAR.bright_red(), err.red());
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert!(matches!(parse_command("hello"), Ok(Command::Message("hello"))));
        assert!(matches!(parse_command("/quit"), Ok(Command::Quit)));
        let Ok(Command::SelectClient(client)) =
            parse_command("/client 3 BMW Motors")
        else {
            panic!("expected a client selection");
        };
        assert_eq!(client, ContextSelector::new("3", "BMW Motors"));
        assert!(parse_command("/client 3").is_err());
        assert!(parse_command("/unknown").is_err());
    }
}
