pub mod cli;
pub mod config;
pub mod dashboard;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;
pub mod trends;

use cli::commands;
use cli::{ Args, Command };
use config::prompt::{ load_prompts_or_default, PromptConfig, TRANSLATOR };
use dashboard::Dashboard;
use history::initialize_history_store;
use llm::chat::{ new_client as new_chat_client, ChatClient };
use log::{ info, warn };
use server::{ AppState, Server };
use std::error::Error;
use std::sync::Arc;
use trends::{ CpmScraper, CpmSource, DisabledTrendsClient, SerpApiTrendsClient, TrendsClient };

fn log_configuration(args: &Args) {
    info!("--- Core Configuration ---");
    info!("Command: {:?}", args.command());
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("adapter default"));
    info!("Chat Temperature: {}", args.chat_temperature);
    info!("Chat Max Retries: {}", args.chat_max_retries);
    info!("Trends Timeframe: {}", args.trends_timeframe);
    info!("Trends Key Present: {}", args.serpapi_api_key.is_some());
    info!("History Store Type: {}", args.history_type);
    info!("History Project: {}", args.history_project_id);
    info!("Prompts Path: {}", args.prompts_path);
    info!("Server Address: {}", args.server_addr);
    info!("-------------------------");
}

fn build_chat_client(args: &Args) -> Result<Arc<dyn ChatClient>, Box<dyn Error + Send + Sync>> {
    let config = args.llm_config()?;
    let client = new_chat_client(&config)?;
    info!(
        "Chat client configured: Type={}, Model={}, BaseURL={:?}",
        config.llm_type,
        client.model(),
        config.base_url.as_deref().unwrap_or("adapter default")
    );
    Ok(client)
}

fn build_trends_client(args: &Args) -> Arc<dyn TrendsClient> {
    let timeframe = Some(args.trends_timeframe.clone()).filter(|t| !t.trim().is_empty());
    let geo = Some(args.trends_geo.clone()).filter(|g| !g.trim().is_empty());
    match
        SerpApiTrendsClient::new(
            args.serpapi_api_key.clone(),
            args.trends_base_url.clone(),
            timeframe,
            geo
        )
    {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!("Trends lookups disabled: {}", e);
            Arc::new(DisabledTrendsClient::new(e.to_string()))
        }
    }
}

async fn serve(args: &Args, prompts: Arc<PromptConfig>) -> Result<(), Box<dyn Error + Send + Sync>> {
    let chat = build_chat_client(args)?;
    let trends = build_trends_client(args);
    let cpm: Arc<dyn CpmSource> = Arc::new(CpmScraper::new(args.cpm_source_url.clone()));
    let history = initialize_history_store(&args.history_config())?;

    let dashboard = Dashboard::new(
        Arc::clone(&chat),
        trends,
        cpm,
        history,
        Arc::clone(&prompts)
    );
    let state = AppState {
        chat,
        prompts,
        dashboard: Arc::new(dashboard),
    };

    info!("Starting server on: {}", args.server_addr);
    Server::new(args.server_addr.clone(), state).run().await
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    log_configuration(&args);
    let prompts = load_prompts_or_default(&args.prompts_path)?;
    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    match args.command() {
        Command::Serve => serve(&args, prompts).await,
        Command::Ask { persona } => {
            let chat = build_chat_client(&args)?;
            let system = prompts.persona(&persona)?;
            commands::ask(chat.as_ref(), system, &mut stdin, &mut stdout).await
        }
        Command::Invoke { prompt } => {
            let chat = build_chat_client(&args)?;
            commands::invoke(chat.as_ref(), &prompt, &mut stdout).await
        }
        Command::Translate { text } => {
            let chat = build_chat_client(&args)?;
            commands::translate(chat.as_ref(), prompts.persona(TRANSLATOR)?, &text, &mut stdout).await
        }
        Command::Chat { session, persona } => {
            let chat = build_chat_client(&args)?;
            let history = initialize_history_store(&args.history_config())?;
            let system = match persona.as_deref() {
                Some(name) => Some(prompts.persona(name)?),
                None => None,
            };
            commands::chat_loop(
                chat.as_ref(),
                history.as_ref(),
                &session,
                system,
                &mut stdin,
                &mut stdout
            ).await
        }
        Command::Trends { keyword } => {
            let trends = build_trends_client(&args);
            let report = dashboard::analyze_keyword(trends.as_ref(), &keyword).await;
            print!("{}", commands::render_trend_report(&report));
            Ok(())
        }
        Command::Niches { top } => {
            let scraper = CpmScraper::new(args.cpm_source_url.clone());
            let table = scraper.fetch().await?;
            print!("{}", commands::render_niches(&trends::top_niches(&table, top)));
            Ok(())
        }
    }
}
