//! Polling message synchronizer behind the chat screen.
//!
//! A [`MessageSync`] owns the in-memory message list of one conversation. It
//! reloads history, polls for newer messages on a fixed period, and sends
//! outgoing text optimistically: a temporary entry is shown at once and later
//! swapped in place for the server's copy, or removed if the send fails.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;

use crate::api::client::Attachment;
use crate::api::error::ApiError;
use crate::api::events::SyncEvent;
use crate::api::models::{MessageKind, MessagePage, SenderType, ServerMessage, TransferReceipt};

pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(5);

/// Upper bound on history pages followed by [`MessageSync::load_all`].
const MAX_HISTORY_PAGES: u64 = 50;

/// Body of the message that announces an uploaded image.
const IMAGE_PLACEHOLDER: &str = "[Image]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    Confirmed(u64),
    /// Client-side placeholder keyed by the millisecond clock at send time.
    Temporary(u64),
}

impl MessageId {
    pub fn is_temporary(&self) -> bool {
        matches!(self, MessageId::Temporary(_))
    }

    pub fn confirmed(&self) -> Option<u64> {
        match self {
            MessageId::Confirmed(id) => Some(*id),
            MessageId::Temporary(_) => None,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Confirmed(id) => write!(f, "{id}"),
            MessageId::Temporary(stamp) => write!(f, "temp-{stamp}"),
        }
    }
}

/// A row of the chat list as the UI renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    /// Sent by this agent rather than the visitor.
    pub mine: bool,
    pub time: String,
}

impl Message {
    pub fn is_pending(&self) -> bool {
        self.id.is_temporary()
    }
}

impl From<&ServerMessage> for Message {
    fn from(msg: &ServerMessage) -> Self {
        Self {
            id: MessageId::Confirmed(msg.id),
            text: msg.message.clone(),
            mine: msg.sender_type == SenderType::Agent,
            time: crate::format::format_message_time(&msg.created_at),
        }
    }
}

/// What the agent asked to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub text: String,
    pub kind: MessageKind,
    pub attachment_url: Option<String>,
}

impl Outgoing {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), kind: MessageKind::Text, attachment_url: None }
    }
}

/// Network side of the synchronizer. Implemented by
/// [`crate::api::ApiClient`]; tests plug in scripted fakes.
#[async_trait]
pub trait MessageTransport: Send + Sync + 'static {
    /// Page 1 is the most recent page.
    async fn fetch_messages(&self, conversation_id: &str, page: u64) -> Result<MessagePage, ApiError>;
    async fn send_message(&self, conversation_id: &str, outgoing: &Outgoing) -> Result<ServerMessage, ApiError>;
    async fn mark_read(&self, conversation_id: &str) -> Result<(), ApiError>;
    async fn upload(&self, conversation_id: &str, attachment: Attachment) -> Result<String, ApiError>;
    async fn transfer(&self, conversation_id: &str, to_agent_id: &str, note: &str) -> Result<TransferReceipt, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing but whitespace was typed.
    Empty,
    /// A previous send has not finished yet.
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Skipped(SkipReason),
    Confirmed(MessageId),
}

/// Highest server identifier present in `messages`, ignoring placeholders.
pub fn known_max_id(messages: &[Message]) -> u64 {
    messages.iter().filter_map(|m| m.id.confirmed()).max().unwrap_or(0)
}

/// Messages of `incoming` that are newer than `known_max` and not already in
/// `existing`, in arrival order.
pub fn select_new(existing: &[Message], incoming: &[ServerMessage], known_max: u64) -> Vec<Message> {
    let mut fresh: Vec<Message> = Vec::new();
    for msg in incoming.iter().filter(|m| m.id > known_max) {
        let id = MessageId::Confirmed(msg.id);
        if existing.iter().chain(fresh.iter()).any(|m| m.id == id) {
            continue;
        }
        fresh.push(Message::from(msg));
    }
    fresh
}

fn temporary_id() -> MessageId {
    let stamp = chrono::Utc::now().timestamp_millis().max(0) as u64;
    MessageId::Temporary(stamp)
}

fn lock(messages: &Mutex<Vec<Message>>) -> MutexGuard<'_, Vec<Message>> {
    // A panic while holding the lock cannot leave the Vec half-written.
    messages.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears the in-flight flag when a send finishes, however it finishes.
struct SendingGuard<'a>(&'a AtomicBool);

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct MessageSync<T: MessageTransport> {
    transport: Arc<T>,
    conversation_id: String,
    messages: Mutex<Vec<Message>>,
    sending: AtomicBool,
    closed: AtomicBool,
    events: UnboundedSender<SyncEvent>,
}

impl<T: MessageTransport> MessageSync<T> {
    pub fn new(transport: Arc<T>, conversation_id: impl Into<String>) -> (Arc<Self>, UnboundedReceiver<SyncEvent>) {
        let (events, rx) = unbounded_channel();
        let sync = Arc::new(Self {
            transport,
            conversation_id: conversation_id.into(),
            messages: Mutex::new(Vec::new()),
            sending: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            events,
        });
        (sync, rx)
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn messages(&self) -> Vec<Message> {
        lock(&self.messages).clone()
    }

    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Detach from the screen. Replies that arrive afterwards are dropped.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn emit(&self, event: SyncEvent) {
        // The receiver going away just means nobody is rendering any more.
        let _ = self.events.send(event);
    }

    fn alert(&self, title: &str, err: &ApiError) {
        self.emit(SyncEvent::alert(title, err.alert_text()));
    }

    /// Initial load, mark-as-read, then polling every `period` until the
    /// returned handle is dropped.
    pub async fn mount(self: &Arc<Self>, period: Duration) -> PollHandle {
        let _ = self.load_all().await;
        if let Err(e) = self.transport.mark_read(&self.conversation_id).await {
            log::warn!("Failed to mark conversation {} read: {e}", self.conversation_id);
        }
        self.start_polling(period)
    }

    /// Replace the local list with the conversation's full history.
    pub async fn load_all(&self) -> Result<usize, ApiError> {
        match self.fetch_history().await {
            Ok(history) => {
                if self.is_closed() {
                    return Ok(0);
                }
                let count = history.len();
                *lock(&self.messages) = history.clone();
                log::debug!("Loaded {count} messages for conversation {}", self.conversation_id);
                self.emit(SyncEvent::Replaced(history));
                Ok(count)
            }
            Err(e) => {
                log::error!("Failed to load messages for {}: {e}", self.conversation_id);
                self.alert("Error", &e);
                Err(e)
            }
        }
    }

    async fn fetch_history(&self) -> Result<Vec<Message>, ApiError> {
        let mut collected: Vec<ServerMessage> = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.transport.fetch_messages(&self.conversation_id, page).await?;
            collected.extend(batch.messages);
            let more = batch.pagination.is_some_and(|p| p.has_more());
            if !more || page >= MAX_HISTORY_PAGES {
                break;
            }
            page += 1;
        }
        collected.sort_by_key(|m| m.id);
        collected.dedup_by_key(|m| m.id);
        Ok(collected.iter().map(Message::from).collect())
    }

    /// Poll using the highest confirmed identifier currently held.
    pub async fn poll_new(&self) -> Result<usize, ApiError> {
        let known_max = known_max_id(&lock(&self.messages));
        self.poll_new_since(known_max).await
    }

    /// Fetch the latest page and append whatever is newer than `known_max`.
    /// Poll failures are logged only; an alert every period would be noise.
    pub async fn poll_new_since(&self, known_max: u64) -> Result<usize, ApiError> {
        let page = match self.transport.fetch_messages(&self.conversation_id, 1).await {
            Ok(page) => page,
            Err(e) => {
                log::warn!("Polling {} failed: {e}", self.conversation_id);
                return Err(e);
            }
        };
        if self.is_closed() {
            return Ok(0);
        }
        let fresh = {
            let mut messages = lock(&self.messages);
            let fresh = select_new(&messages, &page.messages, known_max);
            messages.extend(fresh.iter().cloned());
            fresh
        };
        if !fresh.is_empty() {
            log::debug!("{} new message(s) in {}", fresh.len(), self.conversation_id);
            let count = fresh.len();
            self.emit(SyncEvent::Appended(fresh));
            return Ok(count);
        }
        Ok(0)
    }

    /// Optimistically send a text message.
    pub async fn send(&self, text: &str) -> Result<SendOutcome, ApiError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SendOutcome::Skipped(SkipReason::Empty));
        }
        if self
            .sending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("Send skipped, another send is still in flight");
            return Ok(SendOutcome::Skipped(SkipReason::InFlight));
        }
        let _guard = SendingGuard(&self.sending);

        let temp = Message {
            id: temporary_id(),
            text: text.to_string(),
            mine: true,
            time: crate::format::clock_now(),
        };
        lock(&self.messages).push(temp.clone());
        self.emit(SyncEvent::Appended(vec![temp.clone()]));

        match self.transport.send_message(&self.conversation_id, &Outgoing::text(text)).await {
            Ok(stored) => Ok(SendOutcome::Confirmed(self.confirm(temp.id, &stored))),
            Err(e) => {
                log::error!("Send to {} failed: {e}", self.conversation_id);
                self.discard(temp.id);
                self.alert("Send failed", &e);
                Err(e)
            }
        }
    }

    /// Swap the placeholder for the stored message, in place. If a poll
    /// already appended the stored copy, the placeholder is dropped instead.
    fn confirm(&self, temp_id: MessageId, stored: &ServerMessage) -> MessageId {
        let confirmed = Message { mine: true, ..Message::from(stored) };
        if self.is_closed() {
            return confirmed.id;
        }
        let event = {
            let mut messages = lock(&self.messages);
            let already_polled = messages.iter().any(|m| m.id == confirmed.id);
            let pos = messages.iter().position(|m| m.id == temp_id);
            match (pos, already_polled) {
                (Some(idx), false) => {
                    messages[idx] = confirmed.clone();
                    Some(SyncEvent::Updated { previous: temp_id, message: confirmed.clone() })
                }
                (Some(idx), true) => {
                    messages.remove(idx);
                    Some(SyncEvent::Removed(temp_id))
                }
                (None, _) => None,
            }
        };
        if let Some(event) = event {
            self.emit(event);
        }
        confirmed.id
    }

    fn discard(&self, temp_id: MessageId) {
        if self.is_closed() {
            return;
        }
        let removed = {
            let mut messages = lock(&self.messages);
            let before = messages.len();
            messages.retain(|m| m.id != temp_id);
            before != messages.len()
        };
        if removed {
            self.emit(SyncEvent::Removed(temp_id));
        }
    }

    /// Upload a file, announce it as an image message, then reload history.
    pub async fn send_image(&self, attachment: Attachment) -> Result<(), ApiError> {
        let result = async {
            let url = self.transport.upload(&self.conversation_id, attachment).await?;
            let outgoing = Outgoing {
                text: IMAGE_PLACEHOLDER.to_string(),
                kind: MessageKind::Image,
                attachment_url: Some(url),
            };
            self.transport.send_message(&self.conversation_id, &outgoing).await
        }
        .await;
        match result {
            Ok(_) => self.load_all().await.map(|_| ()),
            Err(e) => {
                log::error!("Image upload to {} failed: {e}", self.conversation_id);
                self.alert("Upload failed", &e);
                Err(e)
            }
        }
    }

    /// Hand the conversation to another agent and reload so the system
    /// message about the transfer shows up.
    pub async fn transfer(&self, to_agent_id: &str, note: &str) -> Result<TransferReceipt, ApiError> {
        if to_agent_id.trim().is_empty() {
            let err = ApiError::Rejected("Please choose an agent to transfer to".into());
            self.alert("Transfer", &err);
            return Err(err);
        }
        match self.transport.transfer(&self.conversation_id, to_agent_id, note).await {
            Ok(receipt) => {
                log::info!("Conversation {} transferred to {}", self.conversation_id, receipt.to_agent);
                let _ = self.load_all().await;
                Ok(receipt)
            }
            Err(e) => {
                log::error!("Transfer of {} failed: {e}", self.conversation_id);
                self.alert("Transfer failed", &e);
                Err(e)
            }
        }
    }

    /// Poll on a fixed period. The first poll happens one period from now.
    pub fn start_polling(self: &Arc<Self>, period: Duration) -> PollHandle {
        let sync = Arc::clone(self);
        let task = crate::utils::spawn_task(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if sync.is_closed() {
                    break;
                }
                let _ = sync.poll_new().await;
            }
        });
        PollHandle { task: Some(task) }
    }
}

/// Keeps the poll timer alive. Dropping it cancels the timer.
#[derive(Debug)]
pub struct PollHandle {
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::Pagination;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn server(id: u64, text: &str, sender: SenderType) -> ServerMessage {
        ServerMessage {
            id,
            conversation_id: "c1".into(),
            sender_type: sender,
            sender_id: "7".into(),
            message: text.into(),
            message_type: MessageKind::Text,
            attachment_url: None,
            is_read: false,
            created_at: "2025-03-04 10:15:00".into(),
        }
    }

    fn visitor(id: u64) -> ServerMessage {
        server(id, &format!("msg {id}"), SenderType::Visitor)
    }

    fn page(ids: &[u64]) -> MessagePage {
        MessagePage { messages: ids.iter().map(|id| visitor(*id)).collect(), pagination: None }
    }

    fn ids(sync: &MessageSync<FakeTransport>) -> Vec<String> {
        sync.messages().iter().map(|m| m.id.to_string()).collect()
    }

    #[derive(Default)]
    struct FakeTransport {
        pages: Mutex<VecDeque<Result<MessagePage, ApiError>>>,
        send_reply: Mutex<Option<Result<ServerMessage, ApiError>>>,
        sent: Mutex<Vec<Outgoing>>,
        fetches: AtomicUsize,
        mark_reads: AtomicUsize,
        /// When set, `send_message` parks until notified.
        gate: Option<Arc<Notify>>,
        entered: Arc<Notify>,
    }

    impl FakeTransport {
        fn with_pages(pages: Vec<Result<MessagePage, ApiError>>) -> Self {
            Self { pages: Mutex::new(pages.into()), ..Self::default() }
        }

        fn reply(self, reply: Result<ServerMessage, ApiError>) -> Self {
            *self.send_reply.lock().unwrap() = Some(reply);
            self
        }
    }

    #[async_trait]
    impl MessageTransport for FakeTransport {
        async fn fetch_messages(&self, _conversation_id: &str, _page: u64) -> Result<MessagePage, ApiError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.pages.lock().unwrap().pop_front().unwrap_or_else(|| Ok(MessagePage::default()))
        }

        async fn send_message(&self, _conversation_id: &str, outgoing: &Outgoing) -> Result<ServerMessage, ApiError> {
            self.sent.lock().unwrap().push(outgoing.clone());
            self.entered.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.send_reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(ApiError::Status(500)))
        }

        async fn mark_read(&self, _conversation_id: &str) -> Result<(), ApiError> {
            self.mark_reads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn upload(&self, _conversation_id: &str, attachment: Attachment) -> Result<String, ApiError> {
            Ok(format!("https://cdn.example.com/{}", attachment.file_name))
        }

        async fn transfer(&self, _conversation_id: &str, to_agent_id: &str, _note: &str) -> Result<TransferReceipt, ApiError> {
            Ok(TransferReceipt { to_agent: to_agent_id.to_string() })
        }
    }

    fn drain(rx: &mut UnboundedReceiver<SyncEvent>) -> Vec<SyncEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn temporary_ids_render_with_prefix() {
        assert_eq!(MessageId::Temporary(1700).to_string(), "temp-1700");
        assert_eq!(MessageId::Confirmed(12).to_string(), "12");
        assert!(temporary_id().is_temporary());
    }

    #[tokio::test]
    async fn load_all_replaces_list_in_id_order() {
        let transport = FakeTransport::with_pages(vec![
            Ok(MessagePage {
                messages: vec![visitor(3), server(4, "hi", SenderType::Agent)],
                pagination: Some(Pagination { page: 1, limit: 2, total: 4, total_pages: 2 }),
            }),
            Ok(page(&[1, 2])),
        ]);
        let (sync, mut rx) = MessageSync::new(Arc::new(transport), "c1");

        assert_eq!(sync.load_all().await.expect("load"), 4);
        assert_eq!(ids(&sync), ["1", "2", "3", "4"]);
        assert!(sync.messages()[3].mine);
        assert_eq!(sync.messages()[3].time, "10:15");
        assert!(matches!(drain(&mut rx).as_slice(), [SyncEvent::Replaced(list)] if list.len() == 4));
    }

    #[tokio::test]
    async fn load_failure_alerts_and_keeps_list() {
        let transport = FakeTransport::with_pages(vec![Ok(page(&[1])), Err(ApiError::Status(503))]);
        let (sync, mut rx) = MessageSync::new(Arc::new(transport), "c1");
        sync.load_all().await.expect("first load");
        drain(&mut rx);

        assert!(sync.load_all().await.is_err());
        assert_eq!(ids(&sync), ["1"]);
        assert!(matches!(drain(&mut rx).as_slice(), [SyncEvent::Alert { title, .. }] if title == "Error"));
    }

    #[tokio::test]
    async fn poll_appends_only_newer_messages() {
        let transport = FakeTransport::with_pages(vec![Ok(page(&[1, 2, 3])), Ok(page(&[2, 3, 4, 5]))]);
        let (sync, mut rx) = MessageSync::new(Arc::new(transport), "c1");
        sync.load_all().await.expect("load");
        drain(&mut rx);

        assert_eq!(sync.poll_new().await.expect("poll"), 2);
        assert_eq!(ids(&sync), ["1", "2", "3", "4", "5"]);
        match drain(&mut rx).as_slice() {
            [SyncEvent::Appended(fresh)] => {
                let fresh: Vec<_> = fresh.iter().map(|m| m.id).collect();
                assert_eq!(fresh, [MessageId::Confirmed(4), MessageId::Confirmed(5)]);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn poll_with_explicit_cursor_never_duplicates() {
        let transport = FakeTransport::with_pages(vec![Ok(page(&[5, 6])), Ok(page(&[5, 6, 6, 7]))]);
        let (sync, _rx) = MessageSync::new(Arc::new(transport), "c1");
        sync.load_all().await.expect("load");

        // A stale cursor must still not re-add what is already held.
        assert_eq!(sync.poll_new_since(0).await.expect("poll"), 1);
        assert_eq!(ids(&sync), ["5", "6", "7"]);
    }

    #[tokio::test]
    async fn poll_failure_is_quiet() {
        let transport = FakeTransport::with_pages(vec![Err(ApiError::Status(502))]);
        let (sync, mut rx) = MessageSync::new(Arc::new(transport), "c1");

        assert!(sync.poll_new().await.is_err());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn successful_send_replaces_placeholder_in_place() {
        let transport = FakeTransport::with_pages(vec![Ok(page(&[1, 2]))])
            .reply(Ok(server(3, "hello", SenderType::Agent)));
        let transport = Arc::new(transport);
        let (sync, mut rx) = MessageSync::new(Arc::clone(&transport), "c1");
        sync.load_all().await.expect("load");
        drain(&mut rx);

        let outcome = sync.send("  hello ").await.expect("send");
        assert_eq!(outcome, SendOutcome::Confirmed(MessageId::Confirmed(3)));
        assert_eq!(ids(&sync), ["1", "2", "3"]);
        assert!(sync.messages().iter().all(|m| !m.is_pending()));
        assert_eq!(transport.sent.lock().unwrap()[0].text, "hello");
        assert!(!sync.is_sending());

        let events = drain(&mut rx);
        assert!(matches!(&events[0], SyncEvent::Appended(list) if list[0].is_pending()));
        assert!(matches!(&events[1], SyncEvent::Updated { previous, message }
            if previous.is_temporary() && message.id == MessageId::Confirmed(3)));
    }

    #[tokio::test]
    async fn failed_send_rolls_back_and_alerts() {
        let transport = FakeTransport::with_pages(vec![Ok(page(&[1]))])
            .reply(Err(ApiError::Rejected("Conversation closed".into())));
        let (sync, mut rx) = MessageSync::new(Arc::new(transport), "c1");
        sync.load_all().await.expect("load");
        let before = sync.messages();
        drain(&mut rx);

        assert!(sync.send("hello").await.is_err());
        assert_eq!(sync.messages(), before);
        assert!(sync.messages().iter().all(|m| m.text != "hello"));
        assert!(!sync.is_sending());

        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(SyncEvent::Alert { title, body })
            if title == "Send failed" && body == "Conversation closed"));
    }

    #[tokio::test]
    async fn whitespace_send_touches_nothing() {
        let transport = Arc::new(FakeTransport::default());
        let (sync, mut rx) = MessageSync::new(Arc::clone(&transport), "c1");

        let outcome = sync.send("   ").await.expect("send");
        assert_eq!(outcome, SendOutcome::Skipped(SkipReason::Empty));
        assert!(sync.messages().is_empty());
        assert!(transport.sent.lock().unwrap().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn overlapping_send_is_ignored() {
        let gate = Arc::new(Notify::new());
        let transport = FakeTransport { gate: Some(Arc::clone(&gate)), ..FakeTransport::default() }
            .reply(Ok(server(10, "first", SenderType::Agent)));
        let transport = Arc::new(transport);
        let entered = Arc::clone(&transport.entered);
        let (sync, _rx) = MessageSync::new(Arc::clone(&transport), "c1");

        let first = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.send("first").await })
        };
        entered.notified().await;
        assert!(sync.is_sending());

        let second = sync.send("hello").await.expect("second send");
        assert_eq!(second, SendOutcome::Skipped(SkipReason::InFlight));
        assert_eq!(sync.messages().len(), 1);
        assert!(sync.messages()[0].is_pending());

        gate.notify_one();
        let first = first.await.expect("join").expect("first send");
        assert_eq!(first, SendOutcome::Confirmed(MessageId::Confirmed(10)));
        assert_eq!(ids(&sync), ["10"]);
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn poll_racing_a_send_does_not_duplicate() {
        let gate = Arc::new(Notify::new());
        let transport = FakeTransport {
            gate: Some(Arc::clone(&gate)),
            ..FakeTransport::with_pages(vec![Ok(page(&[1])), Ok(MessagePage {
                messages: vec![visitor(1), server(2, "hey", SenderType::Agent)],
                pagination: None,
            })])
        }
        .reply(Ok(server(2, "hey", SenderType::Agent)));
        let transport = Arc::new(transport);
        let entered = Arc::clone(&transport.entered);
        let (sync, _rx) = MessageSync::new(Arc::clone(&transport), "c1");
        sync.load_all().await.expect("load");

        let send = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.send("hey").await })
        };
        entered.notified().await;
        sync.poll_new().await.expect("poll");
        gate.notify_one();
        send.await.expect("join").expect("send");

        assert_eq!(ids(&sync), ["1", "2"]);
    }

    #[tokio::test]
    async fn replies_after_close_are_not_applied() {
        let transport = FakeTransport::with_pages(vec![Ok(page(&[1, 2]))]);
        let (sync, mut rx) = MessageSync::new(Arc::new(transport), "c1");
        sync.close();

        assert_eq!(sync.load_all().await.expect("load"), 0);
        assert!(sync.messages().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn send_image_uploads_then_reloads() {
        let transport = FakeTransport::with_pages(vec![Ok(page(&[1, 2]))])
            .reply(Ok(server(2, IMAGE_PLACEHOLDER, SenderType::Agent)));
        let transport = Arc::new(transport);
        let (sync, _rx) = MessageSync::new(Arc::clone(&transport), "c1");

        let attachment = Attachment { file_name: "shot.png".into(), mime_type: "image/png".into(), bytes: vec![1, 2, 3] };
        sync.send_image(attachment).await.expect("image send");

        let sent = transport.sent.lock().unwrap().clone();
        assert_eq!(sent[0].kind, MessageKind::Image);
        assert_eq!(sent[0].attachment_url.as_deref(), Some("https://cdn.example.com/shot.png"));
        assert_eq!(ids(&sync), ["1", "2"]);
    }

    #[tokio::test]
    async fn transfer_requires_a_target() {
        let (sync, mut rx) = MessageSync::new(Arc::new(FakeTransport::default()), "c1");
        assert!(sync.transfer(" ", "").await.is_err());
        assert!(matches!(drain(&mut rx).as_slice(), [SyncEvent::Alert { .. }]));

        let receipt = sync.transfer("A2", "needs billing").await.expect("transfer");
        assert_eq!(receipt.to_agent, "A2");
    }

    #[tokio::test(start_paused = true)]
    async fn mount_polls_until_handle_dropped() {
        let transport = Arc::new(FakeTransport::with_pages(vec![Ok(page(&[1])), Ok(page(&[1, 2]))]));
        let (sync, _rx) = MessageSync::new(Arc::clone(&transport), "c1");

        let handle = sync.mount(DEFAULT_POLL_PERIOD).await;
        assert_eq!(transport.mark_reads.load(Ordering::SeqCst), 1);
        assert_eq!(transport.fetches.load(Ordering::SeqCst), 1);

        tokio::time::sleep(DEFAULT_POLL_PERIOD + Duration::from_millis(10)).await;
        assert_eq!(ids(&sync), ["1", "2"]);

        drop(handle);
        let polled = transport.fetches.load(Ordering::SeqCst);
        tokio::time::sleep(DEFAULT_POLL_PERIOD * 3).await;
        assert_eq!(transport.fetches.load(Ordering::SeqCst), polled);
    }
}
