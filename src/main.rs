use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use roundtable::api::{AddContextRequest, SearchRequest, UpdatePersonaRequest};
use roundtable::dispatch::parse_transcript;
use roundtable::{
    logging, render, ApiClient, AutoAction, ClientConfig, CommandResponse, Diagnostic, DiscussionSession,
    StartDiscussionRequest, StoreChange, WsConnector,
};

#[derive(Parser)]
#[command(name = "roundtable")]
#[command(about = "Terminal client for the multi-agent roundtable discussion backend", version)]
#[command(after_help = "Interactive commands while watching:
  <text>                  send a message to the discussion
  /ask <expert> <text>    put a question to one expert
  /pause /resume /stop    control automatic rounds
  /intervene              request the floor
  /conclude               ask for a conclusion
  /reconnect              reconnect the realtime channel
  /quit                   leave")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Backend base URL, e.g. http://localhost:8000
    #[arg(long, global = true, value_name = "URL")]
    base_url: Option<String>,

    /// Realtime endpoint, e.g. ws://localhost:8000/ws
    #[arg(long, global = true, value_name = "URL")]
    ws_url: Option<String>,

    /// Also write logs to a daily file in this directory
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the live discussion
    Watch,

    /// Start a new discussion and follow it
    Start {
        /// Discussion topic
        topic: String,

        /// Participating agents (repeatable)
        #[arg(short, long = "participant", value_name = "NAME", required = true)]
        participants: Vec<String>,

        /// Company details as key=value (repeatable)
        #[arg(long = "info", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        company_info: Vec<(String, String)>,

        /// Return after starting instead of following
        #[arg(long)]
        detach: bool,
    },

    /// Send a message to the discussion
    Send { content: String },

    /// Ask one expert a question
    Ask { expert: String, question: String },

    /// Control automatic discussion rounds
    Auto {
        #[arg(value_parser = parse_auto_action)]
        action: AutoAction,
    },

    /// Request the floor
    Intervene,

    /// Ask for a conclusion
    Conclude,

    /// In-depth analysis of one question
    DeepDive {
        question: String,

        #[arg(short, long)]
        focus: Option<String>,
    },

    /// Switch to a saved chatroom
    Switch { room_id: String },

    /// List saved chatrooms
    Rooms,

    /// Create an empty chatroom
    CreateRoom { name: String },

    /// Print a chatroom's saved conversation
    History { room_id: String },

    /// Show discussion and connection status
    Status,

    /// Store a piece of context in long-term memory
    Remember {
        context: String,

        #[arg(short, long)]
        agent: Option<String>,
    },

    /// Search long-term memory
    Search {
        query: String,

        #[arg(short, long)]
        agent: Option<String>,

        #[arg(short, long)]
        room: Option<String>,

        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },

    /// Memory index statistics
    Stats,

    /// Inspect or edit agent personas
    Personas {
        #[command(subcommand)]
        command: PersonaCommands,
    },
}

#[derive(Subcommand)]
enum PersonaCommands {
    /// Show every agent's persona
    List,

    /// Change parts of one agent's persona
    Update {
        agent: String,

        #[arg(long)]
        role: Option<String>,

        #[arg(long)]
        goal: Option<String>,

        #[arg(long)]
        backstory: Option<String>,
    },

    /// Restore the default personas
    Reset,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))
}

fn parse_auto_action(raw: &str) -> Result<AutoAction, String> {
    raw.parse()
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = ClientConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(base) = &cli.base_url {
        config.base_url = base.clone();
    }
    if let Some(ws) = &cli.ws_url {
        config.ws_url = Some(ws.clone());
    }
    if let Some(dir) = &cli.log_dir {
        config.log_dir = Some(dir.clone());
    }
    config.validate().context("validating configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{}", Diagnostic::new(err).display().red());
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let _log_guard = logging::init(logging::DEFAULT_FILTER, config.log_dir.as_deref())?;

    let api = ApiClient::new(&config.base_url)?;

    match cli.command.unwrap_or(Commands::Watch) {
        Commands::Watch => {
            println!("{}", "👁  Joining the discussion...".cyan().bold());
            let session = DiscussionSession::open(&config, Arc::new(WsConnector))?;
            if let Err(err) = session.refresh_status().await {
                tracing::warn!(error = %err, "initial status fetch failed");
            }
            session.start_polling();
            follow(session).await?;
        }

        Commands::Start {
            topic,
            participants,
            company_info,
            detach,
        } => {
            println!("{}", format!("🚀 Starting discussion: {topic}").cyan().bold());
            let request = StartDiscussionRequest {
                topic,
                participants,
                company_info: company_info.into_iter().collect::<HashMap<_, _>>(),
            };
            let session = DiscussionSession::open(&config, Arc::new(WsConnector))?;
            match session.start_discussion(&request).await {
                Ok(()) => println!("{} Discussion started", "✓".green()),
                Err(err) => println!(
                    "{} {}",
                    "⚠".yellow(),
                    format!("Backend did not start the discussion: {err}").yellow()
                ),
            }
            if detach {
                for msg in session.store().messages() {
                    println!("{}", render::message(&msg));
                }
                session.close().await;
            } else {
                follow(session).await?;
            }
        }

        Commands::Send { content } => {
            let response = api.send_message(&content).await.context("sending message")?;
            print_response(&response);
        }

        Commands::Ask { expert, question } => {
            let response = api.ask_expert(&expert, &question).await.context("asking expert")?;
            print_response(&response);
        }

        Commands::Auto { action } => {
            let response = api
                .auto_discussion(action)
                .await
                .with_context(|| format!("{} auto discussion", action.as_str()))?;
            println!("{} Auto discussion: {}", "✓".green(), action.as_str().bright_white());
            print_response(&response);
        }

        Commands::Intervene => {
            let response = api.request_intervention().await.context("requesting intervention")?;
            println!("{} Intervention requested", "✓".green());
            print_response(&response);
        }

        Commands::Conclude => {
            let response = api.get_conclusion().await.context("requesting conclusion")?;
            print_response(&response);
        }

        Commands::DeepDive { question, focus } => {
            let response = api
                .deep_dive(&question, focus.as_deref())
                .await
                .context("requesting deep dive")?;
            print_response(&response);
        }

        Commands::Switch { room_id } => {
            let response = api.switch_chatroom(&room_id).await.context("switching chatroom")?;
            println!("{} Switched to {}", "✓".green(), room_id.bright_yellow());
            if let Some(switch) = response.chatroom_switch() {
                let content = switch.conversation_content.unwrap_or_default();
                for msg in &parse_transcript(&content) {
                    println!("{}", render::message(msg));
                }
            }
        }

        Commands::Rooms => {
            let rooms = api.chatrooms().await.context("listing chatrooms")?;
            let status = api.status().await.ok();
            let current = status.as_ref().and_then(|s| s.current_room_id.as_deref());
            if rooms.is_empty() {
                println!("{}", "No saved chatrooms".yellow());
            }
            for room in &rooms {
                println!("{}", render::chatroom(room, current));
            }
        }

        Commands::CreateRoom { name } => {
            let room_id = api.create_chatroom(&name).await.context("creating chatroom")?;
            println!("{} Created chatroom {}", "✓".green(), room_id.bright_yellow());
        }

        Commands::History { room_id } => {
            let content = api
                .chatroom_conversation(&room_id)
                .await
                .context("loading conversation")?;
            for msg in parse_transcript(&content) {
                println!("{}", render::message(&msg));
            }
        }

        Commands::Status => {
            let status = api.status().await.context("fetching status")?;
            let local = status.patch.apply(&Default::default());
            println!("{}", render::status(&local, status.current_room_id.as_deref()));
            if !status.discussion_started {
                println!("{}", "No discussion in progress".yellow());
            }
            match api.websocket_status().await {
                Ok(ws) => println!(
                    "{} {} ({} clients)",
                    "Realtime:".bright_black(),
                    if ws.websocket_connected { "listening".green() } else { "no clients".yellow() },
                    ws.connection_count
                ),
                Err(err) => tracing::debug!(error = %err, "websocket status unavailable"),
            }
        }

        Commands::Remember { context, agent } => {
            api.add_context(&AddContextRequest {
                context,
                agent_name: agent,
                metadata: None,
            })
            .await
            .context("adding context")?;
            println!("{} Context stored", "✓".green());
        }

        Commands::Search {
            query,
            agent,
            room,
            top_k,
        } => {
            let hits = api
                .search(&SearchRequest {
                    agent_name: agent,
                    room_id: room,
                    top_k,
                    ..SearchRequest::common(query)
                })
                .await
                .context("searching memory")?;
            if hits.is_empty() {
                println!("{}", "No matches".yellow());
            }
            for hit in &hits {
                println!("{}", render::search_hit(hit));
            }
        }

        Commands::Stats => {
            let stats = api.memory_stats().await.context("fetching memory stats")?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Commands::Personas { command } => match command {
            PersonaCommands::List => {
                let personas = api.personas().await.context("listing personas")?;
                for (name, persona) in &personas {
                    println!("{}\n", render::persona(name, persona));
                }
            }
            PersonaCommands::Update {
                agent,
                role,
                goal,
                backstory,
            } => {
                let response = api
                    .update_persona(&UpdatePersonaRequest {
                        agent_name: agent,
                        role,
                        goal,
                        backstory,
                    })
                    .await
                    .context("updating persona")?;
                print_response(&response);
            }
            PersonaCommands::Reset => {
                let response = api.reset_personas().await.context("resetting personas")?;
                print_response(&response);
            }
        },
    }

    Ok(())
}

fn print_response(response: &CommandResponse) {
    for msg in &response.messages {
        println!("{}", render::message(msg));
    }
    if let Some(msg) = response.chat_message() {
        println!("{}", render::message(&msg));
    } else if let Some(notice) = response.notice() {
        println!("{} {}", "✓".green(), notice);
    }
}

/// Render store changes and connection transitions, and read commands from
/// stdin, until Ctrl-C or `/quit`.
async fn follow(session: DiscussionSession) -> Result<()> {
    let session = Arc::new(session);
    let mut changes = session.store().subscribe();
    let mut connection = session.connection().watch_state();
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut last_typing: Option<String> = None;
    let mut input_open = true;

    // commands run one at a time off the render loop
    let (actions, queue) = mpsc::unbounded_channel();
    let worker = tokio::spawn(run_actions(session.clone(), queue));

    for msg in session.store().messages() {
        println!("{}", render::message(&msg));
    }
    println!("{}", render::status(&session.store().status(), session.store().room_id().as_deref()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            change = changes.recv() => match change {
                Ok(StoreChange::MessageAdded(msg)) => println!("{}", render::message(&msg)),
                Ok(StoreChange::StatusChanged(status)) => {
                    let typing = render::typing(&status);
                    if typing != last_typing {
                        if let Some(line) = &typing {
                            println!("{line}");
                        }
                        last_typing = typing;
                    }
                }
                Ok(StoreChange::RoomChanged(Some(room))) => {
                    println!("{} {}", "🔀 Room:".cyan(), room.bright_yellow());
                }
                Ok(StoreChange::MessagesCleared) | Ok(StoreChange::Reset) => {
                    println!("{}", "─".repeat(40).bright_black());
                }
                Ok(StoreChange::RoomChanged(None)) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "view fell behind; some changes were not rendered");
                }
                Err(RecvError::Closed) => break,
            },

            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = connection.borrow_and_update().clone();
                println!("{}", render::connection(&state));
            }

            line = input.next_line(), if input_open => match line? {
                Some(line) => match parse_input(line.trim()) {
                    Input::Quit => break,
                    Input::Reconnect => session.connection().manual_reconnect(),
                    Input::Run(action) => {
                        if actions.send(action).is_err() {
                            break;
                        }
                    }
                    Input::Ignored => {}
                },
                // stdin closed; keep following until Ctrl-C
                None => input_open = false,
            },
        }
    }

    println!("{}", "👋 Leaving the discussion".cyan());
    drop(actions);
    worker.abort();
    let _ = worker.await;
    match Arc::try_unwrap(session) {
        Ok(session) => session.close().await,
        Err(_) => tracing::warn!("session still shared at exit; dropping it"),
    }
    Ok(())
}

/// A session command typed at the prompt.
#[derive(Debug, PartialEq)]
enum Action {
    Auto(AutoAction),
    Intervene,
    Conclude,
    Ask { expert: String, question: String },
    Say(String),
}

#[derive(Debug, PartialEq)]
enum Input {
    Quit,
    Reconnect,
    Run(Action),
    Ignored,
}

/// Parse one prompt line. Usage problems are printed here.
fn parse_input(line: &str) -> Input {
    let action = match line.split_once(' ').unwrap_or((line, "")) {
        ("", _) => return Input::Ignored,
        ("/quit", _) | ("/exit", _) => return Input::Quit,
        ("/reconnect", _) => return Input::Reconnect,
        ("/pause", _) => Action::Auto(AutoAction::Pause),
        ("/resume", _) => Action::Auto(AutoAction::Resume),
        ("/stop", _) => Action::Auto(AutoAction::Stop),
        ("/start", _) => Action::Auto(AutoAction::Start),
        ("/intervene", _) => Action::Intervene,
        ("/conclude", _) => Action::Conclude,
        ("/ask", rest) => match rest.trim().split_once(' ') {
            Some((expert, question)) => Action::Ask {
                expert: expert.to_string(),
                question: question.to_string(),
            },
            None => {
                println!("{}", "usage: /ask <expert> <question>".yellow());
                return Input::Ignored;
            }
        },
        (cmd, _) if cmd.starts_with('/') => {
            println!("{}", format!("unknown command {cmd}").yellow());
            return Input::Ignored;
        }
        _ => Action::Say(line.to_string()),
    };
    Input::Run(action)
}

async fn run_actions(session: Arc<DiscussionSession>, mut queue: mpsc::UnboundedReceiver<Action>) {
    while let Some(action) = queue.recv().await {
        let result = match action {
            Action::Auto(auto) => session.control_auto(auto).await.map(drop),
            Action::Intervene => session.request_intervention().await.map(drop),
            Action::Conclude => session.get_conclusion().await.map(drop),
            Action::Ask { expert, question } => session.ask_expert(&expert, &question).await.map(drop),
            Action::Say(text) => session.send_message(&text).await.map(drop),
        };
        if let Err(err) = result {
            println!("{} {}", "✗".red(), err.to_string().red());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input(""), Input::Ignored);
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("/reconnect"), Input::Reconnect);
        assert_eq!(parse_input("/pause"), Input::Run(Action::Auto(AutoAction::Pause)));
        assert_eq!(parse_input("/conclude"), Input::Run(Action::Conclude));
        assert_eq!(
            parse_input("/ask 박매출 가격은?"),
            Input::Run(Action::Ask {
                expert: "박매출".into(),
                question: "가격은?".into()
            })
        );
        assert_eq!(parse_input("/ask 박매출"), Input::Ignored);
        assert_eq!(parse_input("/dance"), Input::Ignored);
        assert_eq!(parse_input("안녕하세요"), Input::Run(Action::Say("안녕하세요".into())));
    }
}
