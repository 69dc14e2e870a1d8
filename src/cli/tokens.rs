use anyhow::Result;
use console::style;

use crate::client::credentials::Credentials;
use crate::config::Settings;
use crate::core::store::ChatStore;
use crate::core::terminal::{print_error, print_success, print_warn};

pub async fn run_token_command(settings: &Settings, args: &[String]) -> Result<()> {
    let sub_cmd = if args.len() > 2 { args[2].as_str() } else { "" };
    let mut user_id = String::new();
    let mut token_name = "cli".to_string();
    let mut token_id = String::new();

    let mut i = 3;
    while i < args.len() {
        match args[i].as_str() {
            "--user" | "-u" => {
                if i + 1 < args.len() {
                    user_id = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--name" | "-n" => {
                if i + 1 < args.len() {
                    token_name = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--id" => {
                if i + 1 < args.len() {
                    token_id = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }

    match sub_cmd {
        "create" => {
            if user_id.is_empty() {
                println!(
                    "{}",
                    style("Usage: mevchat token create --user <id> [--name <name>]").bold()
                );
                return Ok(());
            }
            let store = ChatStore::open(settings.store_path()).await?;
            let (raw_token, record) = store.create_api_token(&user_id, &token_name).await?;
            print_success(&format!("Token '{}' created for user {}", record.name, user_id));
            println!("  ID:    {}", style(&record.id).dim());
            println!("  Token: {}", style(&raw_token).bold().green());
            print_warn("Copy the token now. It will not be shown again.");
        }
        "list" => {
            if user_id.is_empty() {
                println!("{}", style("Usage: mevchat token list --user <id>").bold());
                return Ok(());
            }
            let store = ChatStore::open(settings.store_path()).await?;
            let tokens = store.list_api_tokens(&user_id).await?;
            if tokens.is_empty() {
                println!("No tokens for user {}.", user_id);
            }
            for token in tokens {
                println!(
                    "  {}  {}  {}",
                    style(&token.id).dim(),
                    style(&token.name).bold(),
                    token.created_at
                );
            }
        }
        "revoke" => {
            if token_id.is_empty() {
                println!("{}", style("Usage: mevchat token revoke --id <id>").bold());
                return Ok(());
            }
            let store = ChatStore::open(settings.store_path()).await?;
            if store.revoke_api_token(&token_id).await? {
                print_success(&format!("Token {} revoked", token_id));
            } else {
                print_error(&format!("No token with id {}", token_id));
            }
        }
        _ => {
            print_error("Unknown or missing token command. Expected: create, list, revoke");
        }
    }
    Ok(())
}

pub fn login(settings: &Settings, args: &[String]) -> Result<()> {
    let token = match args.get(2).map(String::as_str) {
        Some("--token") | Some("-t") => args.get(3).cloned(),
        Some(raw) if !raw.starts_with('-') => Some(raw.to_string()),
        _ => None,
    };
    let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
        println!("{}", style("Usage: mevchat login --token <token>").bold());
        return Ok(());
    };

    Credentials::load(&settings.data_dir)?.set(token.trim())?;
    print_success("Token stored. Client commands will use it.");
    Ok(())
}

pub fn logout(settings: &Settings) -> Result<()> {
    Credentials::load(&settings.data_dir)?.clear()?;
    print_success("Stored token removed.");
    Ok(())
}
