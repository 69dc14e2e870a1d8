mod chat;
mod serve;
mod tokens;

use anyhow::Result;
use console::style;

use crate::config::Settings;
use crate::core::suggestions;
use crate::core::terminal::{self, GuideSection, print_error};
use crate::logging;

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Gateway")
        .command("serve", "Run the chat gateway until Ctrl+C")
        .command("token create --user <id>", "Issue an API token for a user")
        .command("token list --user <id>", "List a user's API tokens")
        .command("token revoke --id <id>", "Revoke an API token")
        .print();

    GuideSection::new("Client")
        .command("login --token <token>", "Store the token used by client commands")
        .command("logout", "Forget the stored token")
        .command("ask --prompt <text>", "Ask a question and follow the answer")
        .command("history --session <id>", "Print a session's messages")
        .command("chats", "List your sessions")
        .command("suggest [--count <n>]", "Show example questions, reshuffled each run")
        .print();

    GuideSection::new("Options")
        .command("--api-host / --api-port", "Gateway listen address (serve)")
        .command("--backend-url <url>", "Compute backend base URL (serve)")
        .command("--api-url <url>", "Gateway URL (client commands)")
        .command("--session <id>", "Continue an existing session (ask)")
        .print();

    println!(
        "\n {} {} <command> [flags]\n",
        style("Usage:").bold(),
        style("mevchat").green()
    );
}

/// Value following the flag at `args[*i]`, advancing past both. A trailing flag has no value.
fn take_value(args: &[String], i: &mut usize) -> Option<String> {
    if *i + 1 < args.len() {
        let value = args[*i + 1].clone();
        *i += 2;
        Some(value)
    } else {
        *i += 1;
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServeArgs {
    pub api_host: String,
    pub api_port: u16,
    pub backend_url: String,
}

pub(crate) fn parse_serve_args(args: &[String], start: usize, settings: &Settings) -> ServeArgs {
    let mut parsed = ServeArgs {
        api_host: settings.api_host.clone(),
        api_port: settings.api_port,
        backend_url: settings.backend_url.clone(),
    };
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--api-host" => {
                if let Some(host) = take_value(args, &mut i) {
                    parsed.api_host = host;
                }
            }
            "--api-port" => {
                if let Some(port) = take_value(args, &mut i) {
                    parsed.api_port = port.parse().unwrap_or(settings.api_port);
                }
            }
            "--backend-url" => {
                if let Some(url) = take_value(args, &mut i) {
                    parsed.backend_url = url;
                }
            }
            _ => i += 1,
        }
    }
    parsed
}

/// `--count` for `suggest`; anything missing or unparsable falls back to the default.
pub(crate) fn parse_suggest_count(args: &[String], start: usize) -> usize {
    let mut count = suggestions::DEFAULT_COUNT;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-n" => {
                if let Some(raw) = take_value(args, &mut i) {
                    count = raw.parse().unwrap_or(suggestions::DEFAULT_COUNT);
                }
            }
            _ => i += 1,
        }
    }
    count
}

/// Flags shared by the client commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ClientArgs {
    pub api_url: Option<String>,
    pub prompt: String,
    pub session: Option<String>,
}

pub(crate) fn parse_client_args(args: &[String], start: usize) -> ClientArgs {
    let mut parsed = ClientArgs::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--api-url" => parsed.api_url = take_value(args, &mut i),
            "--prompt" | "-p" => parsed.prompt = take_value(args, &mut i).unwrap_or_default(),
            "--session" | "-s" => parsed.session = take_value(args, &mut i),
            other => {
                // A bare word is the prompt.
                if parsed.prompt.is_empty() && !other.starts_with('-') {
                    parsed.prompt = other.to_string();
                }
                i += 1;
            }
        }
    }
    parsed
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let settings = Settings::load()?;
    logging::init(settings.log_level);

    let cmd = args.get(1).map(String::as_str).unwrap_or("");
    match cmd {
        "serve" => serve::run(&settings, parse_serve_args(&args, 2, &settings)).await,
        "ask" => {
            let parsed = parse_client_args(&args, 2);
            if parsed.prompt.is_empty() {
                print_error("Error: --prompt is required for ask.");
                chat::suggest(suggestions::DEFAULT_COUNT);
                return Ok(());
            }
            chat::ask(&settings, parsed).await
        }
        "history" => {
            let parsed = parse_client_args(&args, 2);
            let Some(session) = parsed.session.clone() else {
                print_error("Error: --session is required for history.");
                return Ok(());
            };
            chat::history(&settings, parsed.api_url, &session).await
        }
        "chats" => chat::chats(&settings, parse_client_args(&args, 2).api_url).await,
        "suggest" => {
            chat::suggest(parse_suggest_count(&args, 2));
            Ok(())
        }
        "token" => tokens::run_token_command(&settings, &args).await,
        "login" => tokens::login(&settings, &args),
        "logout" => tokens::logout(&settings),
        "" | "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            print_error(&format!("Unknown command: {}", other));
            print_help();
            Ok(())
        }
    }
}
