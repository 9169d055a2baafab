use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{info, warn};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use kqlpair::agents::{QueryGenerationAgent, QueryValidationAgent};
use kqlpair::chat::{
    Agent, AuthorRole, CancelSource, ChatEvent, ChatMessage, ChatResult, ConversationHistory, GroupChat,
    RunOutcome, TerminationPolicy, TerminationReason, transcript,
};
use kqlpair::kql;
use kqlpair::llm::{AnthropicClient, LlmClient};

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::{Config, read_instructions};

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kqlpair")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("kqlpair.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Ask {
            request,
            max_iterations,
            no_stream,
            transcript,
            resume,
        } => {
            let options = AskOptions {
                max_iterations: max_iterations.unwrap_or(config.chat.max_iterations),
                streaming: config.chat.streaming && !no_stream,
                transcript: transcript.clone(),
                resume: resume.clone(),
                verbose: cli.is_verbose(),
            };
            handle_ask(request, &options, config).await
        }
        Commands::Validate { query } => handle_validate(query),
        Commands::Show { transcript } => handle_show(transcript),
    }
}

struct AskOptions {
    max_iterations: u32,
    streaming: bool,
    transcript: Option<PathBuf>,
    resume: Option<PathBuf>,
    verbose: bool,
}

fn build_chat(config: &Config, max_iterations: u32, streaming: bool) -> Result<GroupChat> {
    let api_key = std::env::var(&config.llm.api_key_env)
        .context(format!("Environment variable {} is not set", config.llm.api_key_env))?;
    let client: Arc<dyn LlmClient> = Arc::new(
        AnthropicClient::new(api_key, config.llm.client_config()).context("Failed to create model client")?,
    );

    let mut generator = QueryGenerationAgent::new(client.clone()).with_max_tokens(config.llm.max_tokens);
    if let Some(instructions) = read_instructions(config.chat.generation_instructions.as_ref())? {
        generator = generator.with_instructions(instructions);
    }

    let mut validator = QueryValidationAgent::new(client)
        .with_max_tokens(config.llm.max_tokens)
        .with_max_tool_rounds(config.llm.max_tool_rounds);
    if let Some(instructions) = read_instructions(config.chat.validation_instructions.as_ref())? {
        validator = validator.with_instructions(instructions);
    }

    let agents: Vec<Arc<dyn Agent>> = vec![Arc::new(generator), Arc::new(validator)];
    let policy = TerminationPolicy::approval(config.chat.approvers.clone(), max_iterations)
        .with_token(config.chat.approval_token.clone());

    Ok(GroupChat::new(agents, policy)
        .context("Failed to create group chat")?
        .with_streaming(streaming))
}

async fn handle_ask(request: &str, options: &AskOptions, config: &Config) -> Result<()> {
    info!("Running conversation for request: {}", request);

    let chat = build_chat(config, options.max_iterations, options.streaming)?;
    if options.verbose {
        println!(
            "{} {} (max {} turns, model {})",
            "Agents:".yellow(),
            chat.agent_names().join(", "),
            options.max_iterations,
            config.llm.model
        );
    }

    let history = match &options.resume {
        Some(path) => {
            let mut history = transcript::load(path).context(format!("Failed to load {}", path.display()))?;
            history
                .append(ChatMessage::user(request))
                .context("Failed to continue transcript")?;
            history
        }
        None => ConversationHistory::seeded(request),
    };
    for message in history.all() {
        print_message(message);
    }

    let outcome = run_with_printer(&chat, history, tokio::signal::ctrl_c).await;

    let save_path = options
        .transcript
        .clone()
        .or_else(|| config.transcript.save.then(|| transcript::default_path(&config.transcript.directory)));

    match outcome {
        Ok(RunOutcome::Terminated(result)) => {
            save_transcript(save_path.as_deref(), &result.history)?;
            let reason = match result.reason {
                TerminationReason::Approved => result.reason.to_string().green(),
                TerminationReason::IterationLimit => result.reason.to_string().yellow(),
            };
            println!("\n{} {} after {} turns", "DONE".green().bold(), reason, result.iterations);
            Ok(())
        }
        Ok(RunOutcome::Cancelled { history, iterations }) => {
            save_transcript(save_path.as_deref(), &history)?;
            println!("\n{} after {} turns", "CANCELLED".yellow().bold(), iterations);
            Ok(())
        }
        Err(failure) => {
            save_transcript(save_path.as_deref(), &failure.history)?;
            Err(failure).context("Conversation failed")
        }
    }
}

/// Run the chat while printing its events, cancelling whenever `interrupt` fires
async fn run_with_printer<F, Fut>(chat: &GroupChat, history: ConversationHistory, mut interrupt: F) -> ChatResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let source = CancelSource::new();
    let signal = source.signal();
    let (events_tx, events_rx) = mpsc::channel(64);
    let printer = tokio::spawn(print_events(events_rx));

    // The run borrows events_tx, so it must be dropped before the sender is
    let outcome = {
        let run = chat.run_history(history, Some(&events_tx), &signal);
        tokio::pin!(run);
        loop {
            tokio::select! {
                outcome = &mut run => break outcome,
                _ = interrupt() => {
                    warn!("Interrupted, cancelling conversation");
                    println!("\n{}", "Cancelling...".yellow());
                    source.cancel();
                }
            }
        }
    };

    drop(events_tx);
    if let Err(e) = printer.await {
        warn!("Event printer failed: {}", e);
    }
    outcome
}

fn save_transcript(path: Option<&Path>, history: &ConversationHistory) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    transcript::save(path, history).context(format!("Failed to save transcript to {}", path.display()))?;
    println!("{} {}", "Transcript saved:".cyan(), path.display());
    Ok(())
}

async fn print_events(mut rx: mpsc::Receiver<ChatEvent>) {
    let mut streaming_author: Option<String> = None;

    while let Some(event) = rx.recv().await {
        match event {
            ChatEvent::Delta { author, text } => {
                if streaming_author.as_deref() != Some(author.as_str()) {
                    println!("\n{}", format!("# {}:", author).cyan().bold());
                    streaming_author = Some(author);
                }
                print!("{}", text);
                let _ = io::stdout().flush();
            }
            ChatEvent::Message(message) => {
                if streaming_author.take().is_some() {
                    println!();
                } else {
                    print_message(&message);
                }
            }
        }
    }
}

fn print_message(message: &ChatMessage) {
    let header = match message.role {
        AuthorRole::User => "# User:".to_string().green().bold(),
        AuthorRole::Agent => format!("# {}:", message.author_name.as_deref().unwrap_or("*"))
            .cyan()
            .bold(),
    };
    println!("\n{}\n{}", header, message.text());
}

fn handle_validate(query: &str) -> Result<()> {
    let query = if query == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read query from stdin")?;
        buffer
    } else {
        query.to_string()
    };

    let report = kql::validate(&query);
    info!("Validated query: {} diagnostic(s)", report.diagnostics.len());
    if report.is_valid() {
        println!("{}", report.render().green());
    } else {
        println!("{}", kql::INVALID_HEADER.red().bold());
        for diagnostic in &report.diagnostics {
            println!("  {}", diagnostic);
        }
    }
    Ok(())
}

fn handle_show(path: &Path) -> Result<()> {
    let history = transcript::load(path).context(format!("Failed to load {}", path.display()))?;
    for message in history.all() {
        print_message(message);
    }
    println!("\n{} {} messages", "Total:".cyan(), history.len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kqlpair::chat::CancelSignal;
    use std::time::Duration;

    struct Echo(&'static str, &'static str);

    #[async_trait]
    impl Agent for Echo {
        fn name(&self) -> &str {
            self.0
        }

        async fn reply(
            &self,
            _history: &ConversationHistory,
            _cancel: &CancelSignal,
        ) -> kqlpair::Result<ChatMessage> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(ChatMessage::agent(self.0, self.1))
        }
    }

    fn chat(max_iterations: u32) -> GroupChat {
        let agents: Vec<Arc<dyn Agent>> = vec![Arc::new(Echo("A", "draft")), Arc::new(Echo("B", "not yet"))];
        GroupChat::new(agents, TerminationPolicy::approval(["B"], max_iterations)).unwrap()
    }

    #[tokio::test]
    async fn test_run_with_printer_finishes_run() {
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            run_with_printer(&chat(3), ConversationHistory::seeded("ping"), std::future::pending::<io::Result<()>>),
        )
        .await
        .expect("printer should stop once the run ends")
        .unwrap();

        let result = outcome.into_result().unwrap();
        assert_eq!(result.reason, TerminationReason::IterationLimit);
        assert_eq!(result.history.len(), 4);
    }

    #[tokio::test]
    async fn test_run_with_printer_interrupt_cancels() {
        let interrupt = || async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        };
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            run_with_printer(&chat(10_000), ConversationHistory::seeded("ping"), interrupt),
        )
        .await
        .expect("interrupt should cancel the run")
        .unwrap();

        assert!(outcome.is_cancelled());
    }
}
