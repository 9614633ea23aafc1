//! Telegram Bot Integration
//!
//! Long-polls `getUpdates` and feeds text from authorized users into the
//! intake debouncer, keyed by chat id. Replies go out through `sendMessage`,
//! split into chunks Telegram accepts.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::agent::ReplySink;
use crate::intake::IntakeDebouncer;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Telegram rejects messages above 4096 chars; stay clear of it
pub const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Clone)]
pub struct TelegramBot {
    token: String,
    allowed_users: Vec<i64>,
    client: Client,
    api_base: String,
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("allowed_users", &self.allowed_users)
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Deserialize, Debug)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Deserialize, Debug)]
struct Message {
    chat: Chat,
    text: Option<String>,
    from: Option<User>,
}

#[derive(Deserialize, Debug)]
struct Chat {
    id: i64,
}

#[derive(Deserialize, Debug)]
struct User {
    id: i64,
}

#[derive(Deserialize, Debug)]
struct GetUpdatesResponse {
    ok: bool,
    result: Option<Vec<Update>>,
}

/// Split text into chunks of at most `max_chars` chars, preferring line breaks
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max_chars {
            // A single oversized line is cut hard
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

impl TelegramBot {
    pub fn new(token: String, allowed_users: Vec<i64>) -> Self {
        Self {
            token,
            allowed_users,
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            api_base: TELEGRAM_API.to_string(),
        }
    }

    /// Point the bot at another API host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Start the long-polling loop. Runs until the task is dropped.
    pub async fn start_polling(&self, intake: &IntakeDebouncer) -> Result<()> {
        info!("Starting Telegram bot long-polling loop...");
        let mut offset = 0;

        loop {
            match self.poll_once(offset, intake).await {
                Ok(next) => offset = next,
                Err(e) => {
                    error!("Failed to fetch Telegram updates: {}", e.without_url());
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    /// Fetch one batch of updates, route them, return the next offset
    pub async fn poll_once(
        &self,
        offset: i64,
        intake: &IntakeDebouncer,
    ) -> std::result::Result<i64, reqwest::Error> {
        let mut next = offset;
        for update in self.get_updates(offset).await? {
            next = next.max(update.update_id + 1);
            if let Some(msg) = update.message {
                self.handle_message(&msg, intake).await;
            }
        }
        Ok(next)
    }

    async fn get_updates(&self, offset: i64) -> std::result::Result<Vec<Update>, reqwest::Error> {
        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[("offset", offset.to_string()), ("timeout", "30".to_string())])
            .send()
            .await?
            .error_for_status()?
            .json::<GetUpdatesResponse>()
            .await?;

        if !response.ok {
            warn!("Telegram API returned ok=false");
            return Ok(Vec::new());
        }

        Ok(response.result.unwrap_or_default())
    }

    fn is_allowed(&self, user_id: i64) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.contains(&user_id)
    }

    async fn handle_message(&self, msg: &Message, intake: &IntakeDebouncer) {
        let chat_id = msg.chat.id;

        let user_id = match msg.from.as_ref() {
            Some(u) => u.id,
            None => {
                warn!("Message with no user info - ignoring");
                return;
            }
        };

        if !self.is_allowed(user_id) {
            warn!("Unauthorized user {} attempted to use the bot", user_id);
            if let Err(e) = self.send_message(chat_id, "Unauthorized. Access denied.").await {
                error!("Failed to send reply to {}: {}", chat_id, e);
            }
            return;
        }

        let Some(text) = msg.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            debug!("Ignoring non-text message in chat {}", chat_id);
            return;
        };

        if let Some(reply) = builtin_reply(text) {
            if let Err(e) = self.send_message(chat_id, reply).await {
                error!("Failed to send command reply: {}", e);
            }
            return;
        }

        info!(chat_id, user_id, chars = text.chars().count(), "Message received");
        intake.enqueue(&chat_id.to_string(), text);
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        #[derive(Serialize)]
        struct SendMsgReq<'a> {
            chat_id: i64,
            text: &'a str,
        }

        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            let req = SendMsgReq {
                chat_id,
                text: &chunk,
            };
            self.client
                .post(self.method_url("sendMessage"))
                .json(&req)
                .send()
                .await
                .map_err(|e| e.without_url())?
                .error_for_status()
                .map_err(|e| e.without_url())?;
        }
        Ok(())
    }
}

/// Replies for the bot's own commands; anything else goes to the agent
fn builtin_reply(text: &str) -> Option<&'static str> {
    match text.split_whitespace().next().unwrap_or("") {
        "/start" => Some("Wisp is ready. Send me a message or a task."),
        "/help" => Some(
            "Send any text and Wisp decides whether to chat or to run it as a task.\n\
             /task <text> - force a task\n\
             /chat <text> - force a chat reply\n\
             /help        - show this help",
        ),
        _ => None,
    }
}

#[async_trait]
impl ReplySink for TelegramBot {
    async fn send(&self, conversation_id: &str, text: &str) {
        let Ok(chat_id) = conversation_id.parse::<i64>() else {
            error!(conversation_id, "Conversation id is not a Telegram chat id");
            return;
        };
        if let Err(e) = self.send_message(chat_id, text).await {
            error!("Failed to send reply to {}: {}", chat_id, e);
        }
    }
}
