//! Conversation state: messages, the hydration reducers, the shared
//! in-memory view and the persisted store.

pub mod hydrator;
pub mod message;
pub mod store;
pub mod view;

pub use hydrator::{job_ids, shown_count, ConversationHydrator, HydrationOutcome, JobPointer};
pub use message::{AttachedFile, Message, Role, UltraBatchProgress};
pub use store::{Conversation, ConversationStore, ConversationSummary, SaveOptions};
pub use view::ConversationView;
