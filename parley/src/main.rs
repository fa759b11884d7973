//! Parley terminal client
//!
//! ```bash
//! parley register --email ada@example.com --full-name "Ada Lovelace"
//! parley login --email ada@example.com
//! parley chats
//! parley chat
//! parley rename "Ada L."
//! parley logout
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast;
use tracing::info;

use parley_lib::api::auth::SignUpOutcome;
use parley_lib::audio::{ChunkInput, Recorder};
use parley_lib::logging::init_logging;
use parley_lib::models::{DisplayTarget, Message, MessageKind};
use parley_lib::realtime::RealtimeClient;
use parley_lib::sync::{ChatStore, Intent, Notification, Notifier, StoreView, SyncDriver, SyncHandle};
use parley_lib::utils::{content_type_for, day_label};
use parley_lib::{AuthContext, ClientConfig, Platform, SessionStore};

const VOICE_CHUNK_SIZE: usize = 16 * 1024;

/// Chat client for a hosted Postgres + realtime backend
#[derive(Parser)]
#[command(name = "parley")]
#[command(version)]
#[command(about = "Chat from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: String,
        /// Read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Create an account
    Register {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        full_name: String,
        /// Read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Sign out and forget the stored session
    Logout,

    /// List your chats
    Chats {
        /// Only chats whose name or counterpart email contains this
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Open the interactive chat view
    Chat {
        /// Position in the chat list to open first (1-based)
        #[arg(short, long)]
        open: Option<usize>,
    },

    /// Change your display name
    Rename { full_name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ClientConfig::from_env().context("Failed to read configuration")?;
    let _log_guard = init_logging(config.log_dir.as_deref());
    info!(session_file = %config.session_file.display(), "Starting parley");

    let platform = Platform::new(config.clone());
    let auth = AuthContext::init(platform.clone(), SessionStore::new(&config.session_file)).await;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    match cli.command {
        Commands::Login { email, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt(&mut stdin, "Password: ").await?,
            };
            let user = auth.sign_in(&email, &password).await?;
            println!("Signed in as {}", DisplayTarget::User(&user).display_name());
        }

        Commands::Register {
            email,
            full_name,
            password,
        } => {
            let password = match password {
                Some(p) => p,
                None => prompt(&mut stdin, "Password: ").await?,
            };
            match auth.sign_up(&email, &password, &full_name).await? {
                SignUpOutcome::SignedIn(_) => println!("Account created, you are signed in."),
                SignUpOutcome::ConfirmationRequired(_) => {
                    println!("Account created. Check {} for a confirmation link, then log in.", email)
                }
            }
        }

        Commands::Logout => {
            auth.sign_out().await?;
            println!("Signed out.");
        }

        Commands::Chats { filter } => {
            let Some(me) = auth.current_user() else {
                bail!("Not signed in. Run `parley login` first.");
            };
            let mut store = ChatStore::new(Arc::new(platform.clone()), me, Notifier::new());
            store.load_chats().await;
            store.set_filter(filter.as_deref().unwrap_or_default());

            let chats = store.filtered_chats();
            if chats.is_empty() {
                println!("No chats.");
            }
            for (i, chat) in chats.iter().enumerate() {
                let labels: Vec<&str> = chat.labels.iter().map(|l| l.name.as_str()).collect();
                println!(
                    "{:>3}. {}{}{}",
                    i + 1,
                    store.chat_title(chat),
                    if chat.is_group { " (group)" } else { "" },
                    if labels.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", labels.join(", "))
                    }
                );
                if let Some(last) = chat.last_message() {
                    println!("       {}", preview(last));
                }
            }
        }

        Commands::Chat { open } => {
            let Some(me) = auth.current_user() else {
                bail!("Not signed in. Run `parley login` first.");
            };

            let realtime = RealtimeClient::new(&config);
            realtime.set_access_token(auth.session().map(|s| s.access_token));
            realtime.connect();

            // Refreshed tokens go to every joined channel
            let mut tokens = auth.watch_token();
            let forward = {
                let realtime = realtime.clone();
                tokio::spawn(async move {
                    while tokens.changed().await.is_ok() {
                        let token = tokens.borrow_and_update().clone();
                        realtime.set_access_token(token);
                    }
                })
            };

            let notifier = Notifier::new();
            let notifications = notifier.subscribe();
            let store = ChatStore::new(Arc::new(platform.clone()), me, notifier);
            let (driver, handle) = SyncDriver::new(store, realtime.clone());
            let session = tokio::spawn(driver.run());

            if let Some(position) = open {
                // The first snapshot after startup carries the loaded chat list
                let mut view = handle.watch();
                view.changed().await.ok();
                let chat_id = view
                    .borrow()
                    .chats
                    .get(position.saturating_sub(1))
                    .map(|c| c.id.clone());
                match chat_id {
                    Some(id) => handle.send(Intent::Select(id))?,
                    None => eprintln!("No chat at position {}", position),
                }
            }

            let result = interactive(&handle, notifications, &mut stdin).await;

            let _ = handle.send(Intent::Shutdown);
            let _ = session.await;
            forward.abort();
            realtime.disconnect();
            result?;
        }

        Commands::Rename { full_name } => {
            let Some(me) = auth.current_user() else {
                bail!("Not signed in. Run `parley login` first.");
            };
            let notifier = Notifier::new();
            let mut notifications = notifier.subscribe();
            let mut store = ChatStore::new(Arc::new(platform.clone()), me, notifier);
            store.rename_self(&full_name).await;
            while let Ok(notification) = notifications.try_recv() {
                println!("{}", notification);
            }
        }
    }

    auth.teardown();
    Ok(())
}

async fn prompt(stdin: &mut Lines<BufReader<Stdin>>, label: &str) -> Result<String> {
    eprint!("{}", label);
    let line = stdin
        .next_line()
        .await?
        .context("No input")?;
    Ok(line.trim_end().to_string())
}

const HELP: &str = "\
Commands:
  /list                 show chats
  /open N               open chat N
  /filter [TEXT]        filter the chat list
  /label add NAME       label the open chat
  /label rm NAME        remove a label from the open chat
  /file PATH            send a file
  /image PATH           send an image
  /voice PATH           send a recorded voice note
  /users                list people you can chat with
  /dm N                 open a direct chat with person N
  /group NAME N,M,...   create a group with people N, M, ...
  /add N,M,...          add people to the open group
  /delete               delete the open chat (leave, for groups)
  /leave                leave the open group
  /refresh              refetch everything
  /rename NAME          change your display name
  /quit                 exit
Anything else is sent as a message.";

/// What has been printed so far for the open chat
#[derive(Default)]
struct Rendered {
    chat: Option<String>,
    count: usize,
}

async fn interactive(
    handle: &SyncHandle,
    mut notifications: broadcast::Receiver<Notification>,
    stdin: &mut Lines<BufReader<Stdin>>,
) -> Result<()> {
    println!("Type /help for commands.");
    let mut view_rx = handle.watch();
    let mut rendered = Rendered::default();

    loop {
        tokio::select! {
            changed = view_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = view_rx.borrow_and_update().clone();
                render(&view, &mut rendered);
            }
            notice = notifications.recv() => {
                if let Ok(notification) = notice {
                    println!("{}", notification);
                }
            }
            line = stdin.next_line() => {
                match line {
                    Ok(Some(text)) => {
                        if !command(handle, text.trim()).await? {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => eprintln!("Read error: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }
    Ok(())
}

/// Handle one input line; `false` ends the session
async fn command(handle: &SyncHandle, line: &str) -> Result<bool> {
    if line.is_empty() {
        return Ok(true);
    }
    if !line.starts_with('/') {
        handle.send(Intent::Send(line.to_string()))?;
        return Ok(true);
    }

    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    let view = handle.view();

    match cmd {
        "/quit" | "/exit" => return Ok(false),
        "/help" => println!("{}", HELP),
        "/list" => print_chat_list(&view),
        "/open" => match pick(&view.chats, rest) {
            Some(chat) => handle.send(Intent::Select(chat.id.clone()))?,
            None => println!("No such chat. Try /list."),
        },
        "/filter" => {
            handle.send(Intent::Filter(rest.to_string()))?;
        }
        "/label" => {
            let Some(chat_id) = view.selected.clone() else {
                println!("Open a chat first.");
                return Ok(true);
            };
            match rest.split_once(' ') {
                Some(("add", name)) => handle.send(Intent::AddLabel {
                    chat_id,
                    name: name.to_string(),
                })?,
                Some(("rm", name)) => handle.send(Intent::RemoveLabel {
                    chat_id,
                    name: name.trim().to_string(),
                })?,
                _ => println!("Usage: /label add NAME | /label rm NAME"),
            }
        }
        "/file" | "/image" => {
            let path = Path::new(rest);
            let bytes = match tokio::fs::read(path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    println!("Cannot read {}: {}", path.display(), e);
                    return Ok(true);
                }
            };
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| rest.to_string());
            let content_type = content_type_for(&file_name).to_string();
            handle.send(if cmd == "/image" {
                Intent::UploadImage {
                    file_name,
                    bytes,
                    content_type,
                }
            } else {
                Intent::UploadFile {
                    file_name,
                    bytes,
                    content_type,
                }
            })?;
        }
        "/voice" => {
            let bytes = match tokio::fs::read(rest).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    println!("Cannot read {}: {}", rest, e);
                    return Ok(true);
                }
            };
            let (feed, input) = ChunkInput::channel();
            let mut recorder = Recorder::new(input);
            recorder.start()?;
            for chunk in bytes.chunks(VOICE_CHUNK_SIZE) {
                feed.push(chunk.to_vec())?;
            }
            drop(feed);
            let clip = recorder.stop().await?;
            handle.send(Intent::UploadAudio(clip))?;
        }
        "/users" => {
            handle.send(Intent::LoadDirectory)?;
            println!("Loading people; run /users again to refresh the list.");
            for (i, user) in view.directory.iter().enumerate() {
                println!("{:>3}. {} <{}>", i + 1, DisplayTarget::User(user).display_name(), user.email);
            }
        }
        "/dm" => match pick(&view.directory, rest) {
            Some(user) => handle.send(Intent::StartDirectChat(user.id.clone()))?,
            None => println!("No such person. Try /users."),
        },
        "/group" => {
            let (name, picks) = rest.rsplit_once(' ').unwrap_or((rest, ""));
            let member_ids = pick_many(&view.directory, picks);
            handle.send(Intent::CreateGroup {
                name: name.to_string(),
                member_ids,
            })?;
        }
        "/add" => {
            handle.send(Intent::AddMembers(pick_many(&view.directory, rest)))?;
        }
        "/delete" => match view.selected.clone() {
            Some(chat_id) => handle.send(Intent::DeleteChat(chat_id))?,
            None => println!("Open a chat first."),
        },
        "/leave" => match view.selected.clone() {
            Some(chat_id) => handle.send(Intent::LeaveGroup(chat_id))?,
            None => println!("Open a chat first."),
        },
        "/refresh" => handle.send(Intent::Refresh)?,
        "/rename" => handle.send(Intent::Rename(rest.to_string()))?,
        _ => println!("Unknown command. Type /help."),
    }
    Ok(true)
}

/// 1-based pick from a list
fn pick<'a, T>(items: &'a [T], position: &str) -> Option<&'a T> {
    let n: usize = position.trim().parse().ok()?;
    items.get(n.checked_sub(1)?)
}

fn pick_many(users: &[parley_lib::models::User], positions: &str) -> Vec<String> {
    positions
        .split(',')
        .filter_map(|p| pick(users, p))
        .map(|u| u.id.clone())
        .collect()
}

fn print_chat_list(view: &StoreView) {
    if view.chats.is_empty() {
        println!("No chats.");
    }
    for (i, chat) in view.chats.iter().enumerate() {
        let marker = if view.selected.as_deref() == Some(chat.id.as_str()) { '>' } else { ' ' };
        let labels = if chat.labels.is_empty() {
            String::new()
        } else {
            format!(" [{}]", chat.labels.join(", "))
        };
        println!("{}{:>3}. {}{}", marker, i + 1, chat.title, labels);
    }
}

fn render(view: &StoreView, rendered: &mut Rendered) {
    if view.selected != rendered.chat {
        rendered.chat = view.selected.clone();
        rendered.count = 0;
        if let Some(title) = &view.title {
            println!("{}", "─".repeat(50));
            println!("{}", title);
            println!("{}", "─".repeat(50));
        }
    }
    if view.messages.len() < rendered.count {
        // Refetched from scratch
        rendered.count = 0;
    }

    let today = Local::now().date_naive();
    let mut last_day = None;
    for message in &view.messages[rendered.count..] {
        let day = day_label(message.created_at, today);
        if last_day.as_ref() != Some(&day) && rendered.count == 0 {
            println!("  -- {} --", day);
        }
        last_day = Some(day);
        println!(
            "[{}] {}: {}",
            message.created_at.with_timezone(&Local).format("%H:%M"),
            message.display_sender(),
            preview(message)
        );
    }
    rendered.count = view.messages.len();
}

fn preview(message: &Message) -> String {
    let url = message.file_url.as_deref().unwrap_or_default();
    match message.kind() {
        MessageKind::Text => message.content.clone(),
        MessageKind::Image { caption } => format!("[image] {} {}", caption, url),
        MessageKind::Audio { caption } => format!("[voice note] {} {}", caption, url),
        MessageKind::File { caption } => format!("[file] {} {}", caption, url),
    }
}
