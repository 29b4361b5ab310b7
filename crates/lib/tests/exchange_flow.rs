//! Integration test: drive the agent end to end against in-memory platform and backend fakes.
//! No Discord connection or Gemini key required.

use async_trait::async_trait;
use lib::agent::{Agent, ExchangeOutcome};
use lib::channels::{
    Attachment, BotIdentity, ChatPlatform, ConversationRef, HistoryMessage, InboundMessage,
};
use lib::llm::{BackendFailure, GenerativeBackend, ImagePart};
use lib::routing::{GREETING_REPLY, GREETING_TITLE, NOT_AN_IMAGE_REPLY, NOT_AN_IMAGE_TITLE};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const BOT_ID: &str = "42";
const PERSONA: &str = "あなたは算数の先生です。";

#[derive(Debug, Clone, PartialEq)]
enum Action {
    Typing(String),
    CreateThread { from: String, title: String },
    Send { to: String, text: String },
    History(String, usize),
    Fetch(String),
}

#[derive(Default)]
struct FakePlatform {
    actions: Mutex<Vec<Action>>,
    history: Vec<HistoryMessage>,
    /// Number of create_thread calls that fail before one succeeds.
    thread_failures: AtomicUsize,
    /// Conversations whose sends fail.
    broken_targets: Vec<String>,
    /// Attachment downloads fail.
    broken_downloads: bool,
    threads_created: AtomicUsize,
}

impl FakePlatform {
    fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap().clone()
    }

    fn record(&self, action: Action) {
        self.actions.lock().unwrap().push(action);
    }

    fn sends(&self) -> Vec<(String, String)> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Send { to, text } => Some((to, text)),
                _ => None,
            })
            .collect()
    }

    fn thread_titles(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::CreateThread { title, .. } => Some(title),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn broadcast_typing(&self, conversation: &ConversationRef) -> Result<(), String> {
        self.record(Action::Typing(conversation.id.clone()));
        Ok(())
    }

    async fn create_thread(
        &self,
        origin: &InboundMessage,
        title: &str,
    ) -> Result<ConversationRef, String> {
        self.record(Action::CreateThread {
            from: origin.id.clone(),
            title: title.to_string(),
        });
        if self
            .thread_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err("Missing Permissions".to_string());
        }
        let n = self.threads_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ConversationRef::thread(format!("thread-{}", n)))
    }

    async fn send_text(&self, target: &ConversationRef, text: &str) -> Result<(), String> {
        self.record(Action::Send {
            to: target.id.clone(),
            text: text.to_string(),
        });
        if self.broken_targets.iter().any(|t| t == &target.id) {
            return Err("Unknown Channel".to_string());
        }
        Ok(())
    }

    async fn history(
        &self,
        conversation: &ConversationRef,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, String> {
        self.record(Action::History(conversation.id.clone(), limit));
        Ok(self.history.iter().take(limit).cloned().collect())
    }

    async fn fetch_attachment(&self, attachment: &Attachment) -> Result<Vec<u8>, String> {
        self.record(Action::Fetch(attachment.url.clone()));
        if self.broken_downloads {
            return Err("attachment download failed: 404 Not Found (upload)".to_string());
        }
        Ok(vec![0x89, b'P', b'N', b'G'])
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Text(String),
    Image(String, ImagePart),
}

struct FakeBackend {
    reply: Result<String, BackendFailure>,
    calls: Mutex<Vec<Call>>,
}

impl FakeBackend {
    fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            reply: Err(BackendFailure::new(message)),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeBackend for FakeBackend {
    async fn generate_text(&self, prompt: &str) -> Result<String, BackendFailure> {
        self.calls.lock().unwrap().push(Call::Text(prompt.to_string()));
        self.reply.clone()
    }

    async fn generate_with_image(
        &self,
        prompt: &str,
        image: &ImagePart,
    ) -> Result<String, BackendFailure> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Image(prompt.to_string(), image.clone()));
        self.reply.clone()
    }
}

fn bot() -> BotIdentity {
    BotIdentity::new(BOT_ID)
}

fn agent(platform: &Arc<FakePlatform>, backend: &Arc<FakeBackend>) -> Agent {
    Agent::new(platform.clone(), backend.clone(), PERSONA)
}

fn question(conversation: ConversationRef, text: &str) -> InboundMessage {
    InboundMessage {
        id: "900".to_string(),
        conversation,
        author_id: "7".to_string(),
        author_name: "hanako".to_string(),
        author_mention: "<@7>".to_string(),
        text: format!("<@{}> {}", BOT_ID, text),
        mentions: vec![BOT_ID.to_string()],
        attachments: Vec::new(),
    }
}

fn with_attachment(mut m: InboundMessage, content_type: &str) -> InboundMessage {
    m.attachments.push(Attachment {
        filename: "upload".to_string(),
        url: "https://cdn.example/upload".to_string(),
        content_type: Some(content_type.to_string()),
    });
    m
}

fn hist(id: &str, author: &str, text: &str) -> HistoryMessage {
    HistoryMessage {
        id: id.to_string(),
        author_id: author.to_string(),
        text: text.to_string(),
    }
}

#[tokio::test]
async fn ignores_messages_not_addressed_to_the_bot() {
    let platform = Arc::new(FakePlatform::default());
    let backend = Arc::new(FakeBackend::replying("unused"));
    let agent = agent(&platform, &backend);

    let mut unaddressed = question(ConversationRef::channel("10"), "3+4は？");
    unaddressed.text = "3+4は？".to_string();
    unaddressed.mentions.clear();
    assert_eq!(agent.handle(&bot(), unaddressed).await, None);

    let mut own = question(ConversationRef::channel("10"), "hi");
    own.author_id = BOT_ID.to_string();
    assert_eq!(agent.handle(&bot(), own).await, None);

    assert!(platform.actions().is_empty());
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn new_question_opens_thread_and_replies_there() {
    let platform = Arc::new(FakePlatform::default());
    let backend = Arc::new(FakeBackend::replying("<@42> 3 + 4 = 7 だよ！"));
    let agent = agent(&platform, &backend);

    let outcome = agent
        .handle(&bot(), question(ConversationRef::channel("10"), "What is 3+4?"))
        .await;

    assert_eq!(
        outcome,
        Some(ExchangeOutcome::Replied {
            target: ConversationRef::thread("thread-1")
        })
    );
    assert_eq!(
        platform.actions(),
        vec![
            Action::Typing("10".to_string()),
            Action::CreateThread {
                from: "900".to_string(),
                title: "What is 3+4?".to_string()
            },
            Action::Send {
                to: "thread-1".to_string(),
                text: "<@7> 3 + 4 = 7 だよ！".to_string()
            },
        ]
    );
    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    let Call::Text(prompt) = &calls[0] else {
        panic!("expected the text-only capability, got {:?}", calls[0]);
    };
    assert!(prompt.starts_with(PERSONA));
    assert!(prompt.contains("hanako さんからの質問: \"What is 3+4?\""));
    assert!(!prompt.contains("過去の会話履歴"));
}

#[tokio::test]
async fn long_questions_are_cut_in_thread_title() {
    let platform = Arc::new(FakePlatform::default());
    let backend = Arc::new(FakeBackend::replying("ok"));
    let agent = agent(&platform, &backend);
    let text = "1".repeat(60);

    agent
        .handle(&bot(), question(ConversationRef::channel("10"), &text))
        .await;

    assert_eq!(platform.thread_titles(), vec![format!("{}...", "1".repeat(50))]);
}

#[tokio::test]
async fn non_image_attachment_gets_clarification_without_backend_call() {
    let platform = Arc::new(FakePlatform::default());
    let backend = Arc::new(FakeBackend::replying("unused"));
    let agent = agent(&platform, &backend);
    let m = with_attachment(question(ConversationRef::channel("10"), "これ見て"), "application/pdf");

    let outcome = agent.handle(&bot(), m).await;

    assert!(matches!(outcome, Some(ExchangeOutcome::Replied { .. })));
    assert_eq!(platform.thread_titles(), vec![NOT_AN_IMAGE_TITLE.to_string()]);
    assert_eq!(
        platform.sends(),
        vec![("thread-1".to_string(), format!("<@7> {}", NOT_AN_IMAGE_REPLY))]
    );
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn bare_mention_gets_greeting_thread_without_backend_call() {
    let platform = Arc::new(FakePlatform::default());
    let backend = Arc::new(FakeBackend::replying("unused"));
    let agent = agent(&platform, &backend);

    agent
        .handle(&bot(), question(ConversationRef::channel("10"), ""))
        .await;

    assert_eq!(platform.thread_titles(), vec![GREETING_TITLE.to_string()]);
    assert_eq!(
        platform.sends(),
        vec![("thread-1".to_string(), format!("<@7> {}", GREETING_REPLY))]
    );
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn greeting_inside_thread_stays_in_thread() {
    let platform = Arc::new(FakePlatform::default());
    let backend = Arc::new(FakeBackend::replying("unused"));
    let agent = agent(&platform, &backend);

    agent
        .handle(&bot(), question(ConversationRef::thread("55"), ""))
        .await;

    assert!(platform.thread_titles().is_empty());
    assert_eq!(
        platform.sends(),
        vec![("55".to_string(), format!("<@7> {}", GREETING_REPLY))]
    );
}

#[tokio::test]
async fn thread_question_uses_history_without_the_triggering_message() {
    let platform = Arc::new(FakePlatform {
        history: vec![
            hist("1", "7", "<@42> 3+4は？"),
            hist("2", BOT_ID, "<@7> 7だよ"),
            hist("900", "7", "<@42> じゃあ 5+6 は？"),
        ],
        ..Default::default()
    });
    let backend = Arc::new(FakeBackend::replying("11だよ"));
    let agent = agent(&platform, &backend).with_history_limit(20);

    let outcome = agent
        .handle(&bot(), question(ConversationRef::thread("55"), "じゃあ 5+6 は？"))
        .await;

    assert_eq!(
        outcome,
        Some(ExchangeOutcome::Replied {
            target: ConversationRef::thread("55")
        })
    );
    assert!(platform.thread_titles().is_empty());
    assert!(platform.actions().contains(&Action::History("55".to_string(), 20)));
    let Call::Text(prompt) = &backend.calls()[0] else {
        panic!("expected the text-only capability");
    };
    assert!(prompt.contains("過去の会話履歴:\n生徒: 3+4は？\n先生: <@7> 7だよ\n\n---\n\n"));
    assert!(prompt.contains("hanako さんからの新しい質問: \"じゃあ 5+6 は？\""));
    assert_eq!(prompt.matches("じゃあ 5+6 は？").count(), 1);
    assert_eq!(platform.sends(), vec![("55".to_string(), "<@7> 11だよ".to_string())]);
}

#[tokio::test]
async fn image_question_uses_multimodal_capability() {
    let platform = Arc::new(FakePlatform::default());
    let backend = Arc::new(FakeBackend::replying("面積は 12 だよ"));
    let agent = agent(&platform, &backend);
    let m = with_attachment(question(ConversationRef::channel("10"), ""), "image/png");

    agent.handle(&bot(), m).await;

    assert_eq!(platform.thread_titles(), vec!["算数の質問（画像あり）".to_string()]);
    assert!(platform
        .actions()
        .contains(&Action::Fetch("https://cdn.example/upload".to_string())));
    let calls = backend.calls();
    let Call::Image(prompt, image) = &calls[0] else {
        panic!("expected the multimodal capability");
    };
    assert_eq!(image.mime_type, "image/png");
    assert_eq!(image.data, vec![0x89, b'P', b'N', b'G']);
    assert!(prompt.contains("画像とテキストをよく見て"));
}

#[tokio::test]
async fn backend_failure_in_thread_reports_to_same_thread() {
    let platform = Arc::new(FakePlatform::default());
    let backend = Arc::new(FakeBackend::failing("429 Resource has been exhausted (e.g. check quota)."));
    let agent = agent(&platform, &backend);

    let outcome = agent
        .handle(&bot(), question(ConversationRef::thread("55"), "3+4は？"))
        .await;

    assert_eq!(
        outcome,
        Some(ExchangeOutcome::Failed {
            notified: Some(ConversationRef::thread("55"))
        })
    );
    assert!(platform.thread_titles().is_empty());
    let sends = platform.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].0, "55");
    assert!(sends[0].1.contains("429 Resource has been exhausted (e.g. check quota)."));
    assert!(sends[0].1.starts_with("おっと、ますお先生"));
}

#[tokio::test]
async fn backend_failure_after_thread_creation_reports_to_that_thread() {
    let platform = Arc::new(FakePlatform::default());
    let backend = Arc::new(FakeBackend::failing("deadline exceeded"));
    let agent = agent(&platform, &backend);

    let outcome = agent
        .handle(&bot(), question(ConversationRef::channel("10"), "What is 3+4?"))
        .await;

    assert_eq!(
        outcome,
        Some(ExchangeOutcome::Failed {
            notified: Some(ConversationRef::thread("thread-1"))
        })
    );
    assert_eq!(platform.thread_titles(), vec!["What is 3+4?".to_string()]);
    let sends = platform.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].0, "thread-1");
    assert!(sends[0].1.ends_with("`deadline exceeded`"));
}

#[tokio::test]
async fn failed_thread_creation_opens_error_thread() {
    let platform = Arc::new(FakePlatform {
        thread_failures: AtomicUsize::new(1),
        ..Default::default()
    });
    let backend = Arc::new(FakeBackend::replying("unused"));
    let agent = agent(&platform, &backend);

    let outcome = agent
        .handle(&bot(), question(ConversationRef::channel("10"), "3+4は？"))
        .await;

    assert_eq!(
        outcome,
        Some(ExchangeOutcome::Failed {
            notified: Some(ConversationRef::thread("thread-1"))
        })
    );
    assert_eq!(
        platform.thread_titles(),
        vec!["3+4は？".to_string(), "エラー".to_string()]
    );
    let sends = platform.sends();
    assert_eq!(sends.len(), 1);
    assert!(sends[0].1.contains("Missing Permissions"));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn error_notice_falls_back_to_original_channel() {
    let platform = Arc::new(FakePlatform {
        thread_failures: AtomicUsize::new(2),
        ..Default::default()
    });
    let backend = Arc::new(FakeBackend::replying("unused"));
    let agent = agent(&platform, &backend);

    let outcome = agent
        .handle(&bot(), question(ConversationRef::channel("10"), "3+4は？"))
        .await;

    assert_eq!(
        outcome,
        Some(ExchangeOutcome::Failed {
            notified: Some(ConversationRef::channel("10"))
        })
    );
    let sends = platform.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].0, "10");
}

#[tokio::test]
async fn send_failure_in_created_thread_falls_back_to_channel() {
    let platform = Arc::new(FakePlatform {
        broken_targets: vec!["thread-1".to_string()],
        ..Default::default()
    });
    let backend = Arc::new(FakeBackend::replying("7だよ"));
    let agent = agent(&platform, &backend);

    let outcome = agent
        .handle(&bot(), question(ConversationRef::channel("10"), "3+4は？"))
        .await;

    assert_eq!(
        outcome,
        Some(ExchangeOutcome::Failed {
            notified: Some(ConversationRef::channel("10"))
        })
    );
    let sends = platform.sends();
    assert_eq!(sends.len(), 3);
    assert_eq!(sends[0], ("thread-1".to_string(), "<@7> 7だよ".to_string()));
    assert_eq!(sends[1].0, "thread-1");
    assert_eq!(sends[2].0, "10");
    assert!(sends[2].1.contains("Unknown Channel"));
    assert_eq!(platform.thread_titles().len(), 1);
}

#[tokio::test]
async fn undeliverable_error_notice_is_reported_not_raised() {
    let platform = Arc::new(FakePlatform {
        broken_targets: vec!["55".to_string()],
        ..Default::default()
    });
    let backend = Arc::new(FakeBackend::failing("boom"));
    let agent = agent(&platform, &backend);

    let outcome = agent
        .handle(&bot(), question(ConversationRef::thread("55"), "3+4は？"))
        .await;

    assert_eq!(outcome, Some(ExchangeOutcome::Failed { notified: None }));
}

#[tokio::test]
async fn blank_backend_reply_sends_error_notice_to_created_thread() {
    let platform = Arc::new(FakePlatform::default());
    let backend = Arc::new(FakeBackend::replying("  \n "));
    let agent = agent(&platform, &backend);

    let outcome = agent
        .handle(&bot(), question(ConversationRef::channel("10"), "3+4は？"))
        .await;

    assert_eq!(
        outcome,
        Some(ExchangeOutcome::Failed {
            notified: Some(ConversationRef::thread("thread-1"))
        })
    );
    assert_eq!(platform.thread_titles(), vec!["3+4は？".to_string()]);
    let sends = platform.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].0, "thread-1");
    assert!(sends[0].1.starts_with("おっと、ますお先生"));
    assert!(sends[0].1.ends_with("`empty reply`"));
}

#[tokio::test]
async fn mention_only_backend_reply_counts_as_blank() {
    let platform = Arc::new(FakePlatform::default());
    let backend = Arc::new(FakeBackend::replying("<@42>"));
    let agent = agent(&platform, &backend);

    let outcome = agent
        .handle(&bot(), question(ConversationRef::thread("55"), "3+4は？"))
        .await;

    assert_eq!(
        outcome,
        Some(ExchangeOutcome::Failed {
            notified: Some(ConversationRef::thread("55"))
        })
    );
    let sends = platform.sends();
    assert_eq!(sends.len(), 1);
    assert_ne!(sends[0].1, "<@7> ");
    assert!(sends[0].1.ends_with("`empty reply`"));
}

#[tokio::test]
async fn failed_attachment_download_reports_to_created_thread() {
    let platform = Arc::new(FakePlatform {
        broken_downloads: true,
        ..Default::default()
    });
    let backend = Arc::new(FakeBackend::replying("unused"));
    let agent = agent(&platform, &backend);
    let m = with_attachment(question(ConversationRef::channel("10"), "この図形の面積は？"), "image/png");

    let outcome = agent.handle(&bot(), m).await;

    assert_eq!(
        outcome,
        Some(ExchangeOutcome::Failed {
            notified: Some(ConversationRef::thread("thread-1"))
        })
    );
    assert_eq!(platform.thread_titles(), vec!["この図形の面積は？".to_string()]);
    let sends = platform.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].0, "thread-1");
    assert!(sends[0].1.contains("404 Not Found"));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn image_follow_up_in_thread_carries_history_and_image() {
    let platform = Arc::new(FakePlatform {
        history: vec![
            hist("1", "7", "<@42> 三角形の面積は？"),
            hist("2", BOT_ID, "<@7> 底辺×高さ÷2 だよ"),
            hist("900", "7", "<@42> これは？"),
        ],
        ..Default::default()
    });
    let backend = Arc::new(FakeBackend::replying("6 だね"));
    let agent = agent(&platform, &backend);
    let m = with_attachment(question(ConversationRef::thread("55"), "これは？"), "image/jpeg");

    let outcome = agent.handle(&bot(), m).await;

    assert_eq!(
        outcome,
        Some(ExchangeOutcome::Replied {
            target: ConversationRef::thread("55")
        })
    );
    assert!(platform.thread_titles().is_empty());
    assert!(platform.actions().contains(&Action::History("55".to_string(), 50)));
    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    let Call::Image(prompt, image) = &calls[0] else {
        panic!("expected the multimodal capability");
    };
    assert_eq!(image.mime_type, "image/jpeg");
    assert!(prompt.contains("過去の会話履歴:\n生徒: 三角形の面積は？\n先生: <@7> 底辺×高さ÷2 だよ\n\n---\n\n"));
    assert!(prompt.contains("画像とテキストをよく見て、これまでの会話を踏まえて"));
    assert!(prompt.ends_with("テキスト: \"これは？\""));
    assert_eq!(platform.sends(), vec![("55".to_string(), "<@7> 6 だね".to_string())]);
}

#[tokio::test]
async fn concurrent_exchanges_get_their_own_threads() {
    let platform = Arc::new(FakePlatform::default());
    let backend = Arc::new(FakeBackend::replying("ok"));
    let agent = agent(&platform, &backend);
    let bot = bot();

    let mut second = question(ConversationRef::channel("10"), "2+2は？");
    second.id = "901".to_string();
    let (a, b) = futures_util::future::join(
        agent.handle(&bot, question(ConversationRef::channel("10"), "1+1は？")),
        agent.handle(&bot, second),
    )
    .await;

    let (Some(ExchangeOutcome::Replied { target: ta }), Some(ExchangeOutcome::Replied { target: tb })) =
        (a, b)
    else {
        panic!("both exchanges should reply");
    };
    assert_ne!(ta, tb);
    let mut titles = platform.thread_titles();
    titles.sort();
    assert_eq!(titles, vec!["1+1は？".to_string(), "2+2は？".to_string()]);
}
