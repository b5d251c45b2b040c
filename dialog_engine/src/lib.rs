pub mod awareness;
pub mod sequencer;
pub mod session;
pub mod world;

pub use sequencer::{AbortReason, ActorContext, Phase};
pub use session::{
    ActorPolicy, AlertnessInterrupt, DialogSession, InterruptBehaviour, SessionConfig,
    SessionLink, SessionStatus,
};
