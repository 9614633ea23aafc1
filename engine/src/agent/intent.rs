//! Intent classification: chat or task
//!
//! Order of rules:
//! 1. `/task`, `/t` force a task; `/chat`, `/c` force chat (prefix stripped)
//! 2. very short inputs are chat
//! 3. one cheap-model call
//! 4. if that call fails, a deterministic verb + noun pattern match
//!
//! Classification never fails; ambiguity resolves to chat.

use crate::llm::gateway::{LLMGateway, ModelChoice};
use crate::llm::Message;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

const CLASSIFY_PROMPT: &str = r#"Classify the user's message as CHAT or TASK. Answer with exactly one word.

CHAT: greetings, small talk, opinions, questions answerable from knowledge.
  "hi there" -> CHAT
  "what is a monad?" -> CHAT
  "谢谢" -> CHAT
TASK: requests to do something in the world with files, commands, services or the web.
  "create a README file for the project" -> TASK
  "fix the failing deploy script" -> TASK
  "下载这个网页并总结" -> TASK"#;

const TASK_PREFIXES: &[&str] = &["/task", "/t"];
const CHAT_PREFIXES: &[&str] = &["/chat", "/c"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Chat,
    Task,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Chat => write!(f, "chat"),
            Intent::Task => write!(f, "task"),
        }
    }
}

/// Which rule decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecidedBy {
    Prefix,
    Length,
    Model,
    Pattern,
}

/// Classifier output. `text` has any command prefix removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,
    pub text: String,
    pub decided_by: DecidedBy,
}

/// Strip a command prefix if `input` starts with one as a whole word
fn strip_command<'a>(input: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    prefixes.iter().find_map(|prefix| {
        let rest = input.strip_prefix(prefix)?;
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            Some(rest.trim())
        } else {
            None
        }
    })
}

pub struct IntentClassifier {
    gateway: Arc<LLMGateway>,
    min_chars: usize,
}

impl IntentClassifier {
    pub fn new(gateway: Arc<LLMGateway>, min_chars: usize) -> Self {
        Self { gateway, min_chars }
    }

    pub async fn classify(&self, input: &str) -> Classification {
        let input = input.trim();

        if let Some(text) = strip_command(input, TASK_PREFIXES) {
            return Classification {
                intent: Intent::Task,
                text: text.to_string(),
                decided_by: DecidedBy::Prefix,
            };
        }
        if let Some(text) = strip_command(input, CHAT_PREFIXES) {
            return Classification {
                intent: Intent::Chat,
                text: text.to_string(),
                decided_by: DecidedBy::Prefix,
            };
        }

        let decide = |intent, decided_by| Classification {
            intent,
            text: input.to_string(),
            decided_by,
        };

        if input.chars().count() < self.min_chars {
            return decide(Intent::Chat, DecidedBy::Length);
        }

        match self
            .gateway
            .complete(&[Message::user(input)], CLASSIFY_PROMPT, ModelChoice::Cheap)
            .await
        {
            Ok(answer) => {
                let intent = parse_answer(&answer);
                debug!(%intent, answer = answer.trim(), "Classified by model");
                decide(intent, DecidedBy::Model)
            }
            Err(e) => {
                let intent = pattern_intent(input);
                warn!(error = %e, %intent, "Classifier call failed, used pattern rules");
                decide(intent, DecidedBy::Pattern)
            }
        }
    }
}

/// Task only on an unambiguous "task" answer
fn parse_answer(answer: &str) -> Intent {
    let lower = answer.to_lowercase();
    if lower.contains("task") && !lower.contains("chat") {
        Intent::Task
    } else {
        Intent::Chat
    }
}

fn verb_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(fix|build|deploy|create|write|run|install|delete|remove|update|generate|configure|set up|setup|refactor|debug|download|edit|make)\b|修复|创建|部署|写|运行|安装|删除|更新|生成|配置|下载",
        )
        .expect("Invalid verb pattern")
    })
}

fn noun_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(files?|services?|scripts?|databases?|servers?|repo|repository|readme|projects?|code|config|tests?|functions?|directory|folder)\b|文件|服务|脚本|数据库|服务器|项目|代码|目录",
        )
        .expect("Invalid noun pattern")
    })
}

/// Deterministic fallback: an action verb together with an object noun
pub fn pattern_intent(text: &str) -> Intent {
    if verb_regex().is_match(text) && noun_regex().is_match(text) {
        Intent::Task
    } else {
        Intent::Chat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LLMConfig;
    use crate::llm::{LLMError, LLMProvider};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LLMProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _: &[Message], _: &str, _: &str) -> crate::llm::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(str::to_string)
                .ok_or_else(|| LLMError::InvalidRequest("down".to_string()))
        }
    }

    fn classifier(reply: Option<&'static str>) -> (IntentClassifier, Arc<Scripted>) {
        let provider = Arc::new(Scripted {
            reply,
            calls: AtomicUsize::new(0),
        });
        let gateway = LLMGateway::new(
            Arc::clone(&provider) as Arc<dyn LLMProvider>,
            &LLMConfig::default(),
        );
        (IntentClassifier::new(Arc::new(gateway), 5), provider)
    }

    #[tokio::test]
    async fn test_prefix_forces_without_model_call() {
        let (c, provider) = classifier(Some("CHAT"));

        let task = c.classify("/task 创建一个 README 文件").await;
        assert_eq!(task.intent, Intent::Task);
        assert_eq!(task.text, "创建一个 README 文件");
        assert_eq!(task.decided_by, DecidedBy::Prefix);

        let chat = c.classify("/c deploy the server now").await;
        assert_eq!(chat.intent, Intent::Chat);
        assert_eq!(chat.text, "deploy the server now");

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_prefix_must_be_whole_word() {
        let (c, _) = classifier(Some("CHAT"));
        let out = c.classify("/tasks are fun to list").await;
        assert_eq!(out.decided_by, DecidedBy::Model);
    }

    #[tokio::test]
    async fn test_short_input_is_chat() {
        let (c, provider) = classifier(Some("TASK"));
        let out = c.classify("嗨").await;
        assert_eq!(out.intent, Intent::Chat);
        assert_eq!(out.decided_by, DecidedBy::Length);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_answer_and_fallback() {
        let (c, provider) = classifier(Some("TASK"));
        assert_eq!(c.classify("please tidy my notes").await.intent, Intent::Task);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let (c, _) = classifier(Some("Either TASK or CHAT"));
        assert_eq!(c.classify("please tidy my notes").await.intent, Intent::Chat);

        let (c, _) = classifier(None);
        let out = c.classify("fix the deploy script").await;
        assert_eq!(out.intent, Intent::Task);
        assert_eq!(out.decided_by, DecidedBy::Pattern);
    }

    #[test]
    fn test_pattern_needs_verb_and_noun() {
        assert_eq!(pattern_intent("create a README"), Intent::Task);
        assert_eq!(pattern_intent("修复数据库连接"), Intent::Task);
        assert_eq!(pattern_intent("create something nice"), Intent::Chat);
        assert_eq!(pattern_intent("the file is lovely"), Intent::Chat);
        assert_eq!(pattern_intent("rerun is not a verb here, filed"), Intent::Chat);
    }
}
