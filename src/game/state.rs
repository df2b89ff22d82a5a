use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::board::{
    evaluate, winning_line, Board, CellIndex, GameResult, Marker, WinLine, WIN_LINES,
};
use crate::ai::AiDifficulty;

/// 最近对局记录的保留条数。
pub const HISTORY_LIMIT: usize = 3;
pub const INITIAL_STATUS: &str = "Waiting for players...";
pub const RESTART_STATUS: &str = "Game restarted!";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// 人类执先手，AI 执另一方。
    #[default]
    Single,
    Local,
    /// 落子由链上合约裁决，本地棋盘只做镜像。
    Contract,
}

impl FromStr for GameMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" | "ai" => Ok(GameMode::Single),
            "local" => Ok(GameMode::Local),
            "contract" | "online" => Ok(GameMode::Contract),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type")]
pub enum GamePhase {
    #[default]
    NotStarted,
    InProgress,
    Won {
        winner: Marker,
    },
    Draw,
}

impl GamePhase {
    pub fn is_over(&self) -> bool {
        matches!(self, GamePhase::Won { .. } | GamePhase::Draw)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub board: Board,
    pub winner: Marker,
}

/// 纯展示层偏好，不参与规则判定。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preferences {
    #[serde(default = "default_dark_mode")]
    pub dark_mode: bool,
    #[serde(default)]
    pub music_playing: bool,
    #[serde(default)]
    pub show_rules: bool,
}

fn default_dark_mode() -> bool {
    true
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            dark_mode: default_dark_mode(),
            music_playing: false,
            show_rules: false,
        }
    }
}

/// 游戏事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    MarkerPlaced { marker: Marker, index: CellIndex },
    TurnPassed { next: Marker },
    GameWon { winner: Marker, line: WinLine },
    GameDrawn,
    GameReset { starting: Marker },
    ModeChanged { mode: GameMode },
    DifficultyChanged { difficulty: AiDifficulty },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    MarkerCountMismatch {
        starting: usize,
        other: usize,
    },
    /// 双方同时占满连线，正常对局不可能出现。
    MultipleWinners,
    PhaseMismatch {
        expected: GamePhase,
        actual: GamePhase,
    },
    TurnMismatch {
        expected: Marker,
        actual: Marker,
    },
    WinningLineMismatch {
        #[serde(skip_serializing_if = "Option::is_none")]
        expected: Option<WinLine>,
        #[serde(skip_serializing_if = "Option::is_none")]
        actual: Option<WinLine>,
    },
}

/// 单局游戏整体状态。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    #[serde(default)]
    pub board: Board,
    pub turn: Marker,
    pub starting_marker: Marker,
    #[serde(default)]
    pub mode: GameMode,
    #[serde(default)]
    pub difficulty: AiDifficulty,
    #[serde(default)]
    pub phase: GamePhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_line: Option<WinLine>,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
}

impl GameState {
    pub fn new(mode: GameMode) -> Self {
        let starting = Marker::default();
        Self {
            board: Board::new(),
            turn: starting,
            starting_marker: starting,
            mode,
            difficulty: AiDifficulty::default(),
            phase: GamePhase::NotStarted,
            winning_line: None,
            status: INITIAL_STATUS.to_string(),
            history: Vec::new(),
            preferences: Preferences::default(),
            event_log: Vec::new(),
        }
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    pub fn result(&self) -> GameResult {
        evaluate(&self.board)
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_over()
    }

    /// 单人模式下 AI 执后手方。
    pub fn ai_marker(&self) -> Option<Marker> {
        match self.mode {
            GameMode::Single => Some(self.starting_marker.opponent()),
            GameMode::Local | GameMode::Contract => None,
        }
    }

    pub fn awaiting_ai(&self) -> bool {
        !self.is_finished() && self.ai_marker() == Some(self.turn)
    }

    pub fn set_mode(&mut self, mode: GameMode) {
        if self.mode != mode {
            self.mode = mode;
            self.record_event(GameEvent::ModeChanged { mode });
        }
    }

    pub fn set_difficulty(&mut self, difficulty: AiDifficulty) {
        if self.difficulty != difficulty {
            self.difficulty = difficulty;
            self.record_event(GameEvent::DifficultyChanged { difficulty });
        }
    }

    /// 最新的对局排在最前，超出上限的旧记录被丢弃。
    pub fn push_history(&mut self, entry: HistoryEntry, limit: usize) {
        self.history.insert(0, entry);
        self.history.truncate(limit);
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        let starting = self.board.count(self.starting_marker);
        let other = self.board.count(self.starting_marker.opponent());
        if starting != other && starting != other + 1 {
            return Err(IntegrityError::MarkerCountMismatch { starting, other });
        }
        if [Marker::X, Marker::O]
            .iter()
            .all(|&marker| completes_line(&self.board, marker))
        {
            return Err(IntegrityError::MultipleWinners);
        }

        let result = self.result();
        let phase_matches = match result {
            GameResult::Won { winner } => self.phase == GamePhase::Won { winner },
            GameResult::Draw => self.phase == GamePhase::Draw,
            GameResult::InProgress => match self.phase {
                GamePhase::NotStarted => self.board.is_blank(),
                GamePhase::InProgress => true,
                GamePhase::Won { .. } | GamePhase::Draw => false,
            },
        };
        if !phase_matches {
            return Err(IntegrityError::PhaseMismatch {
                expected: expected_phase(result),
                actual: self.phase,
            });
        }

        // 终局时不再换手，`turn` 停留在最后落子的一方。
        let last_mover = if starting > other {
            self.starting_marker
        } else {
            self.starting_marker.opponent()
        };
        let expected_turn = if self.is_finished() {
            last_mover
        } else {
            last_mover.opponent()
        };
        if self.turn != expected_turn {
            return Err(IntegrityError::TurnMismatch {
                expected: expected_turn,
                actual: self.turn,
            });
        }

        let expected_line = winning_line(&self.board).map(|(_, line)| line);
        if self.winning_line != expected_line {
            return Err(IntegrityError::WinningLineMismatch {
                expected: expected_line,
                actual: self.winning_line,
            });
        }

        Ok(())
    }
}

impl Default for GameState {
    fn default() -> Self {
        GameState::new(GameMode::default())
    }
}

fn completes_line(board: &Board, marker: Marker) -> bool {
    WIN_LINES
        .iter()
        .any(|line| line.iter().all(|&index| board.get(index) == Some(marker)))
}

fn expected_phase(result: GameResult) -> GamePhase {
    match result {
        GameResult::Won { winner } => GamePhase::Won { winner },
        GameResult::Draw => GamePhase::Draw,
        GameResult::InProgress => GamePhase::InProgress,
    }
}

pub fn turn_status(marker: Marker) -> String {
    format!("Turn: {marker}")
}

pub fn win_status(winner: Marker) -> String {
    format!("{winner} wins! 🎉")
}

pub fn draw_status() -> String {
    "Draw! 🤝".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_waits_for_first_move() {
        let state = GameState::default();
        assert_eq!(state.phase, GamePhase::NotStarted);
        assert_eq!(state.turn, Marker::X);
        assert_eq!(state.starting_marker, Marker::X);
        assert_eq!(state.mode, GameMode::Single);
        assert_eq!(state.difficulty, AiDifficulty::Medium);
        assert_eq!(state.status, INITIAL_STATUS);
        assert!(state.preferences.dark_mode);
        assert!(state.integrity_check().is_ok());
    }

    #[test]
    fn ai_plays_the_non_starting_marker_in_single_mode() {
        let mut state = GameState::new(GameMode::Single);
        assert_eq!(state.ai_marker(), Some(Marker::O));
        assert!(!state.awaiting_ai());

        state.turn = Marker::O;
        assert!(state.awaiting_ai());

        state.set_mode(GameMode::Local);
        assert_eq!(state.ai_marker(), None);
        assert!(!state.awaiting_ai());
        assert_eq!(
            state.event_log,
            vec![GameEvent::ModeChanged {
                mode: GameMode::Local
            }]
        );
    }

    #[test]
    fn unchanged_settings_are_not_logged() {
        let mut state = GameState::new(GameMode::Local);
        state.set_mode(GameMode::Local);
        state.set_difficulty(AiDifficulty::Medium);
        assert!(state.event_log.is_empty());

        state.set_difficulty(AiDifficulty::Hard);
        assert_eq!(state.difficulty, AiDifficulty::Hard);
        assert_eq!(state.event_log.len(), 1);
    }

    #[test]
    fn history_keeps_newest_entries() {
        let mut state = GameState::default();
        for (index, winner) in [Marker::X, Marker::O, Marker::X, Marker::O]
            .into_iter()
            .enumerate()
        {
            let mut board = Board::new();
            board.set(index as CellIndex, Some(winner));
            state.push_history(HistoryEntry { board, winner }, HISTORY_LIMIT);
        }
        assert_eq!(state.history.len(), HISTORY_LIMIT);
        assert_eq!(state.history[0].winner, Marker::O);
        assert_eq!(state.history[0].board.get(3), Some(Marker::O));
        assert_eq!(state.history[2].board.get(1), Some(Marker::O));
    }

    #[test]
    fn integrity_rejects_impossible_counts() {
        let mut state = GameState::default();
        state.board = "XX_/___/___".parse().expect("layout should parse");
        state.phase = GamePhase::InProgress;
        assert_eq!(
            state.integrity_check(),
            Err(IntegrityError::MarkerCountMismatch {
                starting: 2,
                other: 0
            })
        );
    }

    #[test]
    fn integrity_rejects_stale_phase_and_turn() {
        let mut state = GameState::default();
        state.board = "XXX/OO_/___".parse().expect("layout should parse");
        state.phase = GamePhase::InProgress;
        state.turn = Marker::X;
        assert!(matches!(
            state.integrity_check(),
            Err(IntegrityError::PhaseMismatch { .. })
        ));

        state.phase = GamePhase::Won { winner: Marker::X };
        state.winning_line = Some([0, 1, 2]);
        assert!(state.integrity_check().is_ok());

        state.turn = Marker::O;
        assert_eq!(
            state.integrity_check(),
            Err(IntegrityError::TurnMismatch {
                expected: Marker::X,
                actual: Marker::O
            })
        );
    }

    #[test]
    fn integrity_rejects_two_winners() {
        let mut state = GameState::default();
        state.board = "XXX/OOO/___".parse().expect("layout should parse");
        state.starting_marker = Marker::O;
        state.turn = Marker::X;
        state.phase = GamePhase::Won { winner: Marker::X };
        state.winning_line = Some([0, 1, 2]);
        assert_eq!(state.integrity_check(), Err(IntegrityError::MultipleWinners));

        state.board = "XXX/OO_/___".parse().expect("layout should parse");
        state.starting_marker = Marker::X;
        assert!(state.integrity_check().is_ok());
    }

    #[test]
    fn integrity_rejects_missing_winning_line() {
        let mut state = GameState::default();
        state.board = "XXX/OO_/___".parse().expect("layout should parse");
        state.phase = GamePhase::Won { winner: Marker::X };
        assert_eq!(
            state.integrity_check(),
            Err(IntegrityError::WinningLineMismatch {
                expected: Some([0, 1, 2]),
                actual: None
            })
        );
    }

    #[test]
    fn state_accepts_minimal_json() {
        let state: GameState =
            serde_json::from_str(r#"{"turn":"O","starting_marker":"O","mode":"local"}"#)
                .expect("minimal state should parse");
        assert_eq!(state.board, Board::new());
        assert_eq!(state.mode, GameMode::Local);
        assert_eq!(state.phase, GamePhase::NotStarted);
        assert!(state.preferences.dark_mode);
        assert!(state.integrity_check().is_ok());
    }

    #[test]
    fn mode_parses_aliases() {
        assert_eq!("single".parse(), Ok(GameMode::Single));
        assert_eq!("Local".parse(), Ok(GameMode::Local));
        assert_eq!("online".parse(), Ok(GameMode::Contract));
        assert!("arcade".parse::<GameMode>().is_err());
    }
}
