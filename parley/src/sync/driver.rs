use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::store::{ChangeScope, ChatStore, Loading};
use crate::audio::AudioClip;
use crate::error::{ClientError, ClientResult};
use crate::models::{Message, User};
use crate::realtime::{ChangeEvent, ChangeFilter, ChangeKind, ChangeSubscription, RealtimeClient};

/// Something the user asked for
#[derive(Debug)]
pub enum Intent {
    Select(String),
    Send(String),
    UploadFile {
        file_name: String,
        bytes: Vec<u8>,
        content_type: String,
    },
    UploadImage {
        file_name: String,
        bytes: Vec<u8>,
        content_type: String,
    },
    UploadAudio(AudioClip),
    AddLabel {
        chat_id: String,
        name: String,
    },
    RemoveLabel {
        chat_id: String,
        name: String,
    },
    CreateGroup {
        name: String,
        member_ids: Vec<String>,
    },
    StartDirectChat(String),
    AddMembers(Vec<String>),
    DeleteChat(String),
    LeaveGroup(String),
    LoadDirectory,
    Filter(String),
    Rename(String),
    Refresh,
    Shutdown,
}

/// One row of the chat list as rendered
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRow {
    pub id: String,
    pub title: String,
    pub is_group: bool,
    pub labels: Vec<String>,
    pub last_message: Option<String>,
}

/// Snapshot of the store for rendering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreView {
    pub me: Option<User>,
    pub chats: Vec<ChatRow>,
    pub selected: Option<String>,
    pub title: Option<String>,
    pub messages: Vec<Message>,
    pub directory: Vec<User>,
    pub filter: String,
    pub loading: Loading,
}

impl StoreView {
    fn capture(store: &ChatStore) -> Self {
        let chats = store
            .filtered_chats()
            .into_iter()
            .map(|chat| ChatRow {
                id: chat.id.clone(),
                title: store.chat_title(chat),
                is_group: chat.is_group,
                labels: chat.labels.iter().map(|l| l.name.clone()).collect(),
                last_message: chat.last_message().map(|m| m.content.clone()),
            })
            .collect();

        Self {
            me: Some(store.current_user().clone()),
            chats,
            selected: store.selected_chat_id().map(String::from),
            title: store.selected_chat().map(|c| store.chat_title(c)),
            messages: store.visible_messages().to_vec(),
            directory: store.directory().to_vec(),
            filter: store.filter().to_string(),
            loading: store.loading(),
        }
    }
}

/// Front-end side of a running [`SyncDriver`]
#[derive(Clone)]
pub struct SyncHandle {
    intents: mpsc::UnboundedSender<Intent>,
    view: watch::Receiver<StoreView>,
}

impl SyncHandle {
    pub fn send(&self, intent: Intent) -> ClientResult<()> {
        self.intents
            .send(intent)
            .map_err(|_| ClientError::realtime("Chat session has stopped"))
    }

    pub fn view(&self) -> StoreView {
        self.view.borrow().clone()
    }

    /// Watch for new snapshots
    pub fn watch(&self) -> watch::Receiver<StoreView> {
        self.view.clone()
    }
}

/// Owns the [`ChatStore`] and feeds it realtime changes and user intents,
/// one at a time
pub struct SyncDriver {
    store: ChatStore,
    realtime: RealtimeClient,
    intents: mpsc::UnboundedReceiver<Intent>,
    view_tx: watch::Sender<StoreView>,
}

impl SyncDriver {
    pub fn new(store: ChatStore, realtime: RealtimeClient) -> (Self, SyncHandle) {
        let (intent_tx, intents) = mpsc::unbounded_channel();
        let (view_tx, view) = watch::channel(StoreView::capture(&store));
        let driver = Self {
            store,
            realtime,
            intents,
            view_tx,
        };
        let handle = SyncHandle {
            intents: intent_tx,
            view,
        };
        (driver, handle)
    }

    /// Run until [`Intent::Shutdown`] or every handle is dropped
    pub async fn run(mut self) -> ChatStore {
        let me = self.store.current_user().id.clone();
        let mut all_messages = self.realtime.subscribe(
            &format!("messages-realtime-all-{}", me),
            ChangeFilter::table("messages").on(ChangeKind::Insert),
        );
        let mut chat_list = self
            .realtime
            .subscribe(&format!("chats-realtime-{}", me), ChangeFilter::table("messages"));

        self.store.load_chats().await;
        let mut open_chat: Option<ChangeSubscription> = None;
        self.follow_open_chat(&mut open_chat);
        self.publish();

        loop {
            tokio::select! {
                Some(event) = all_messages.recv() => {
                    self.store.handle_change(ChangeScope::AllMessages, event).await;
                }
                Some(event) = chat_list.recv() => {
                    self.store.handle_change(ChangeScope::ChatList, event).await;
                }
                Some(event) = next_change(&mut open_chat) => {
                    self.store.handle_change(ChangeScope::OpenChat, event).await;
                }
                intent = self.intents.recv() => match intent {
                    None | Some(Intent::Shutdown) => {
                        info!("Chat session stopping");
                        break;
                    }
                    Some(intent) => self.apply(intent).await,
                },
            }

            self.follow_open_chat(&mut open_chat);
            self.publish();
        }

        self.realtime.unsubscribe(all_messages);
        self.realtime.unsubscribe(chat_list);
        if let Some(open) = open_chat {
            self.realtime.unsubscribe(open);
        }
        self.store
    }

    async fn apply(&mut self, intent: Intent) {
        debug!(intent = ?IntentName(&intent), "Handling intent");
        let store = &mut self.store;
        match intent {
            Intent::Select(chat_id) => store.select_chat(&chat_id).await,
            Intent::Send(text) => {
                store.send_text(&text).await;
            }
            Intent::UploadFile {
                file_name,
                bytes,
                content_type,
            } => {
                store.upload_file(&file_name, bytes, &content_type).await;
            }
            Intent::UploadImage {
                file_name,
                bytes,
                content_type,
            } => {
                store.upload_image(&file_name, bytes, &content_type).await;
            }
            Intent::UploadAudio(clip) => {
                store.upload_audio(clip).await;
            }
            Intent::AddLabel { chat_id, name } => {
                store.add_label(&chat_id, &name).await;
            }
            Intent::RemoveLabel { chat_id, name } => {
                store.remove_label(&chat_id, &name).await;
            }
            Intent::CreateGroup { name, member_ids } => {
                store.create_group(&name, member_ids).await;
            }
            Intent::StartDirectChat(user_id) => {
                store.start_direct_chat(&user_id).await;
            }
            Intent::AddMembers(member_ids) => {
                store.add_members(member_ids).await;
            }
            Intent::DeleteChat(chat_id) => {
                store.delete_chat(&chat_id).await;
            }
            Intent::LeaveGroup(chat_id) => {
                store.leave_group(&chat_id).await;
            }
            Intent::LoadDirectory => store.load_directory().await,
            Intent::Filter(query) => store.set_filter(&query),
            Intent::Rename(full_name) => {
                store.rename_self(&full_name).await;
            }
            Intent::Refresh => store.refresh().await,
            Intent::Shutdown => {}
        }
    }

    /// Keep exactly one open-chat channel, for whichever chat is selected
    fn follow_open_chat(&self, open_chat: &mut Option<ChangeSubscription>) {
        let wanted = self
            .store
            .selected_chat_id()
            .map(|id| format!("messages-realtime-chat-{}", id));
        let current = open_chat
            .as_ref()
            .map(|sub| sub.topic().trim_start_matches("realtime:").to_string());
        if wanted == current {
            return;
        }

        if let Some(previous) = open_chat.take() {
            self.realtime.unsubscribe(previous);
        }
        if let (Some(name), Some(chat_id)) = (wanted, self.store.selected_chat_id()) {
            *open_chat = Some(self.realtime.subscribe(
                &name,
                ChangeFilter::table("messages")
                    .on(ChangeKind::Insert)
                    .column_eq("chat_id", chat_id),
            ));
        }
    }

    fn publish(&self) {
        self.view_tx.send_replace(StoreView::capture(&self.store));
    }
}

async fn next_change(subscription: &mut Option<ChangeSubscription>) -> Option<ChangeEvent> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

/// Logs an intent without dumping upload bytes
struct IntentName<'a>(&'a Intent);

impl std::fmt::Debug for IntentName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.0 {
            Intent::Select(_) => "select",
            Intent::Send(_) => "send",
            Intent::UploadFile { .. } => "upload_file",
            Intent::UploadImage { .. } => "upload_image",
            Intent::UploadAudio(_) => "upload_audio",
            Intent::AddLabel { .. } => "add_label",
            Intent::RemoveLabel { .. } => "remove_label",
            Intent::CreateGroup { .. } => "create_group",
            Intent::StartDirectChat(_) => "start_direct_chat",
            Intent::AddMembers(_) => "add_members",
            Intent::DeleteChat(_) => "delete_chat",
            Intent::LeaveGroup(_) => "leave_group",
            Intent::LoadDirectory => "load_directory",
            Intent::Filter(_) => "filter",
            Intent::Rename(_) => "rename",
            Intent::Refresh => "refresh",
            Intent::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}
