pub mod line;
pub mod script;

pub use line::{ActorId, FacialSpec, LineSpec, MAX_ACTORS};
pub use script::{DialogScript, ScriptBuilder, ScriptError};
