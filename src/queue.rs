use crate::encoder::Message;
use tokio::sync::mpsc;

/// Default number of messages held before new ones are dropped.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Producer side of the delivery mailbox.
///
/// Pushing never blocks: when all slots are taken the message is handed back
/// inside [`QueueOverflow`] and the caller decides how to report it.
#[derive(Clone, Debug)]
pub struct Mailbox {
    sender: mpsc::Sender<Message>,
}

/// Consumer side, owned by the delivery loop.
pub type Inbox = mpsc::Receiver<Message>;

/// Create a mailbox with room for `capacity` messages (at least one).
pub fn mailbox(capacity: usize) -> (Mailbox, Inbox) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (Mailbox { sender }, receiver)
}

impl Mailbox {
    pub fn push(&self, message: Message) -> Result<(), QueueOverflow> {
        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(m) => QueueOverflow { message: m, closed: false },
            mpsc::error::TrySendError::Closed(m) => QueueOverflow { message: m, closed: true },
        })
    }

    /// Number of free slots left.
    pub fn remaining(&self) -> usize {
        self.sender.capacity()
    }
}

/// A message that could not be queued.
#[derive(thiserror::Error, Debug)]
#[error("raven queue overflow on: {}", .message.text)]
pub struct QueueOverflow {
    pub message: Message,
    /// `true` when the consumer is gone rather than busy.
    pub closed: bool,
}
