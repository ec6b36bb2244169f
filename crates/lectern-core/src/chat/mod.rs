//! Session coordination.

pub mod coordinator;
pub mod lock;
pub mod view;

pub use coordinator::{
    Conversation, SessionCoordinator, SlideAdvance, SlidePage, TurnExchange, Upload,
};
pub use lock::SessionLocks;
pub use view::build_transcript_view;
