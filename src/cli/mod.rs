pub mod commands;

use anyhow::{bail, Context, Result};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use crate::auth::TokenAuthority;
use crate::catalog::CardCatalog;
use crate::cli::commands::{CardsAction, Commands, SessionAction, TokenAction};
use crate::config::AppConfig;
use crate::db::get_connection;
use crate::llm::ProviderFactory;
use crate::reading::{DrawRequest, ReadingService, ReadingSession, SessionStore};

pub async fn run_cli(command: Commands, config_path: String) -> Result<()> {
    let config = AppConfig::load(&config_path).context("Failed to load config")?;

    match command {
        Commands::Serve => {
            bail!("Serve command should be intercepted by main.rs to boot actix-web");
        }
        Commands::Session { action } => {
            let pool = get_connection(&config.database).context("DB error")?;
            let store = SessionStore::new(pool);

            match action {
                SessionAction::Show { id } => {
                    let session = store.load(&id)?;
                    print!("{}", render_transcript(&session));
                }
                SessionAction::Export { id, path } => {
                    let session = store.load(&id)?;
                    let export_path = path.unwrap_or_else(|| format!("session_{}.txt", id));
                    std::fs::write(&export_path, render_transcript(&session))
                        .with_context(|| format!("Failed to write {}", export_path))?;
                    println!("Session exported successfully to: {}", export_path);
                }
            }
        }
        Commands::Cards { action } => {
            let catalog = CardCatalog::load(config.reading.catalog_path.as_deref())?;
            let cards = match action {
                CardsAction::List => catalog.list().to_vec(),
                CardsAction::Draw { count } => catalog.sample(count),
            };
            println!("{:<24} | {:<24} | {}", "Name", "Type", "Image");
            println!("{:-<24}-+-{:-<24}-+-{:-<16}", "", "", "");
            for card in cards {
                println!("{:<24} | {:<24} | {}", card.name, card.card_type, card.image);
            }
        }
        Commands::Token { action } => match action {
            TokenAction::Issue { user } => {
                let authority = TokenAuthority::from_config(&config.auth);
                println!("{}", authority.issue(user)?);
            }
        },
        Commands::Reading { cards, detail } => {
            run_repl(config, cards, detail).await?;
        }
    }
    Ok(())
}

/// Plain-text transcript in the export format.
pub fn render_transcript(session: &ReadingSession) -> String {
    let mut out = String::new();
    out.push_str(&format!("Session: {}\n", session.session_id));
    match session.user_id {
        Some(user) => out.push_str(&format!("User: {}\n", user)),
        None => out.push_str("User: anonymous\n"),
    }
    out.push_str(&format!("Phase: {:?}\n", session.phase()));
    if !session.cards.is_empty() {
        let names: Vec<&str> = session.cards.iter().map(|c| c.name.as_str()).collect();
        out.push_str(&format!("Cards: {}\n", names.join(", ")));
    }
    out.push_str("---\n");

    for m in &session.history {
        out.push_str(&format!("[{}]: {}\n", m.role.as_str().to_uppercase(), m.content));
        out.push_str("---\n");
    }
    out
}

fn prompt_line(label: &str) -> Result<Option<String>> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    if io::stdin().lock().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

async fn run_repl(config: AppConfig, card_count: usize, detail: Option<String>) -> Result<()> {
    let pool = get_connection(&config.database).context("DB error")?;
    let catalog = CardCatalog::load(config.reading.catalog_path.as_deref())?;
    let llm = ProviderFactory::create_default(&config).context("Failed to init LLM provider")?;
    let service = ReadingService::from_config(&config, pool, catalog, Arc::clone(&llm));

    println!("--- Arcana Terminal Reading ---");
    println!("Type /exit to quit.");
    println!("-------------------------------");

    let created = service.new_session(None).await?;
    println!("Session: {}", created.session_id);
    println!("\nReader> {}", created.greeting);

    println!("\nWhat would you like to ask the cards? (empty line to finish)");
    let mut questions = Vec::new();
    while let Some(line) = prompt_line("Question> ")? {
        if line.is_empty() {
            break;
        }
        if line == "/exit" || line == "/quit" {
            return Ok(());
        }
        questions.push(line);
    }
    service
        .submit_questions(&created.session_id, questions, None)
        .await?;

    let spread: Vec<String> = service
        .catalog()
        .sample(card_count.max(1))
        .into_iter()
        .map(|c| c.name)
        .collect();
    println!("\nYou drew: {}", spread.join(", "));

    let result = service
        .draw_cards(
            DrawRequest {
                session_id: created.session_id.clone(),
                cards: spread,
                detail,
                ..Default::default()
            },
            None,
        )
        .await?;
    println!("\nReader> {}", result.interpretation);

    while let Some(text) = prompt_line("\nYou> ")? {
        if text.is_empty() {
            continue;
        }
        if text == "/exit" || text == "/quit" {
            break;
        }
        match service.send_message(&created.session_id, &text).await {
            Ok(reply) => println!("\nReader> {}", reply),
            Err(e) if e.is_retryable() => eprintln!("The reader is silent ({}). Try again.", e),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
