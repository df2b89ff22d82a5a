//! 游戏核心逻辑模块（棋盘判定、状态机、规则引擎）。

pub mod board;
pub mod rules;
pub mod state;

pub use board::{
    evaluate, winning_line, Board, CellIndex, GameResult, Marker, Position, WinLine, CELL_COUNT,
    WIN_LINES,
};
pub use rules::{MoveAction, MoveOrigin, RuleEngine, RuleError, RuleResolution};
pub use state::{
    GameEvent, GameMode, GamePhase, GameState, HistoryEntry, IntegrityError, Preferences,
};
