pub mod event;
pub mod message;
pub mod status;

pub use event::{ChatroomSwitch, ClientFrame, ServerEvent};
pub use message::{Message, MessageType, SYSTEM_SENDER, USER_SENDER};
pub use status::{CurrentSpeaker, DiscussionState, Participant, Status, StatusPatch};
