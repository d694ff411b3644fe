// Observers - presentation-side consumers of the event feed
//
// None of these ever call back into a session; they only read events.

pub mod cues;
pub mod moves_log;
pub mod score;

pub use self::cues::{Cue, CueDispatcher, CuePlayer, LoggingCuePlayer};
pub use self::moves_log::{MoveLog, MoveRecord};
pub use self::score::{ScoreBoard, ScoreSummary};
