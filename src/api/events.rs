use crate::sync::{Message, MessageId};

/// Notifications pushed from a [`crate::sync::MessageSync`] to whoever renders it.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The whole list was reloaded.
    Replaced(Vec<Message>),
    /// New messages landed at the end of the list.
    Appended(Vec<Message>),
    /// The entry that was `previous` is now `message`, at the same position.
    Updated { previous: MessageId, message: Message },
    /// An optimistic entry was rolled back.
    Removed(MessageId),
    /// Something the agent should see in a dismissable dialog.
    Alert { title: String, body: String },
}

impl SyncEvent {
    pub fn alert(title: impl Into<String>, body: impl Into<String>) -> Self {
        SyncEvent::Alert { title: title.into(), body: body.into() }
    }
}
