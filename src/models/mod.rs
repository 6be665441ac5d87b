pub mod conversation;
pub mod message;
pub mod receipt;

pub use conversation::ConversationMember;
pub use message::{
    AttachmentSummary, Message, MessageEdit, MessagePage, MessageType, MessageView, NewMessage,
    PageOptions, ReplySummary, SenderSummary, DELETED_MESSAGE_TOMBSTONE,
};
pub use receipt::{MessageReceipt, ReceiptType};
