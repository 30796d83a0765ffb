pub mod batch;
pub mod engine;
pub mod game;
pub mod position;
pub mod record;
pub mod render;
pub mod types;

pub use batch::{ConfigurationResult, RunSpec, run_batch, run_batch_with, setup_output};
pub use engine::{Engine, EngineConfig, EngineProcess};
pub use game::{GameConfig, GameRecord, run_game, terminal_state};
pub use position::{
    OpeningError, OpeningLine, build_opening, describe_position, line_label, replay,
};
pub use record::save_match;
pub use types::{
    EvalLog, InfoSnapshot, MatchResult, SearchOutcome, SearchRequest, Tally, Termination,
    side_label,
};
