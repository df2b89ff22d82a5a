use serde::{Deserialize, Serialize};

use super::{
    board::{evaluate, winning_line, CellIndex, GameResult, Marker, Position, CELL_COUNT},
    state::{
        draw_status, turn_status, win_status, GameEvent, GamePhase, GameState, HistoryEntry,
        IntegrityError, HISTORY_LIMIT, RESTART_STATUS,
    },
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MoveOrigin {
    #[default]
    Human,
    Ai,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MoveAction {
    pub index: CellIndex,
    #[serde(default)]
    pub origin: MoveOrigin,
}

impl MoveAction {
    pub fn human(index: CellIndex) -> Self {
        Self {
            index,
            origin: MoveOrigin::Human,
        }
    }

    pub fn ai(index: CellIndex) -> Self {
        Self {
            index,
            origin: MoveOrigin::Ai,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RuleError {
    GameFinished,
    InvalidCell { index: CellIndex },
    InvalidPosition { row: u8, col: u8 },
    CellOccupied { index: CellIndex },
    AwaitingAi { ai: Marker },
    NotAiTurn,
    IntegrityViolation { error: IntegrityError },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    pub result: GameResult,
}

impl RuleResolution {
    pub fn new(state: GameState, events: Vec<GameEvent>) -> Self {
        let result = state.result();
        Self {
            state,
            events,
            result,
        }
    }
}

pub struct RuleEngine {
    history_limit: usize,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            history_limit: HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    fn ensure_open(state: &GameState) -> Result<(), RuleError> {
        if state.is_finished() {
            return Err(RuleError::GameFinished);
        }
        Ok(())
    }

    fn ensure_mover(state: &GameState, origin: MoveOrigin) -> Result<(), RuleError> {
        match origin {
            MoveOrigin::Human if state.awaiting_ai() => {
                Err(RuleError::AwaitingAi { ai: state.turn })
            }
            MoveOrigin::Ai if !state.awaiting_ai() => Err(RuleError::NotAiTurn),
            _ => Ok(()),
        }
    }

    fn ensure_vacant(state: &GameState, index: CellIndex) -> Result<(), RuleError> {
        if usize::from(index) >= CELL_COUNT {
            return Err(RuleError::InvalidCell { index });
        }
        if !state.board.is_empty_cell(index) {
            return Err(RuleError::CellOccupied { index });
        }
        Ok(())
    }

    /// 落子并推进状态机。失败时状态保持不变。
    pub fn play_move(
        &self,
        state: &mut GameState,
        action: MoveAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_open(state)?;
        Self::ensure_vacant(state, action.index)?;
        Self::ensure_mover(state, action.origin)?;

        let marker = state.turn;
        state.board.set(action.index, Some(marker));

        let mut events = vec![GameEvent::MarkerPlaced {
            marker,
            index: action.index,
        }];

        if let Some((winner, line)) = winning_line(&state.board) {
            state.phase = GamePhase::Won { winner };
            state.winning_line = Some(line);
            state.status = win_status(winner);
            state.push_history(
                HistoryEntry {
                    board: state.board,
                    winner,
                },
                self.history_limit,
            );
            events.push(GameEvent::GameWon { winner, line });
            crate::log!("game over: {winner} wins on {line:?} ({})", state.board);
        } else if evaluate(&state.board) == GameResult::Draw {
            state.phase = GamePhase::Draw;
            state.status = draw_status();
            events.push(GameEvent::GameDrawn);
            crate::log!("game over: draw ({})", state.board);
        } else {
            let next = marker.opponent();
            state.phase = GamePhase::InProgress;
            state.turn = next;
            state.status = turn_status(next);
            events.push(GameEvent::TurnPassed { next });
        }

        state.event_log.extend(events.iter().cloned());
        Ok(events)
    }

    /// 以合约使用的 (row, col) 坐标落子。
    pub fn play_at(
        &self,
        state: &mut GameState,
        row: u8,
        col: u8,
        origin: MoveOrigin,
    ) -> Result<Vec<GameEvent>, RuleError> {
        let position = Position::new(row, col).ok_or(RuleError::InvalidPosition { row, col })?;
        self.play_move(
            state,
            MoveAction {
                index: position.index(),
                origin,
            },
        )
    }

    /// 清空棋盘并交换先手，历史记录与偏好保留。
    pub fn reset(&self, state: &mut GameState) -> Vec<GameEvent> {
        let starting = state.starting_marker.opponent();
        state.starting_marker = starting;
        state.turn = starting;
        state.board = Default::default();
        state.winning_line = None;
        state.phase = GamePhase::InProgress;
        state.status = RESTART_STATUS.to_string();
        state.event_log.clear();

        let event = GameEvent::GameReset { starting };
        state.record_event(event.clone());
        crate::log!("game reset, {starting} starts");
        vec![event]
    }

    pub fn validate(state: &GameState) -> Result<(), RuleError> {
        state
            .integrity_check()
            .map_err(|error| RuleError::IntegrityViolation { error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Board, GameMode};

    fn local_state() -> GameState {
        GameState::new(GameMode::Local)
    }

    fn play_all(engine: &RuleEngine, state: &mut GameState, cells: &[CellIndex]) {
        for &cell in cells {
            engine
                .play_move(state, MoveAction::human(cell))
                .expect("move should be legal");
        }
    }

    #[test]
    fn first_move_starts_game_and_passes_turn() {
        let engine = RuleEngine::new();
        let mut state = local_state();

        let events = engine
            .play_move(&mut state, MoveAction::human(4))
            .expect("move should succeed");

        assert_eq!(state.phase, GamePhase::InProgress);
        assert_eq!(state.board.get(4), Some(Marker::X));
        assert_eq!(state.turn, Marker::O);
        assert_eq!(state.status, "Turn: O");
        assert_eq!(
            events,
            vec![
                GameEvent::MarkerPlaced {
                    marker: Marker::X,
                    index: 4
                },
                GameEvent::TurnPassed { next: Marker::O },
            ]
        );
        assert_eq!(state.event_log, events);
    }

    #[test]
    fn occupied_cell_is_rejected_without_side_effects() {
        let engine = RuleEngine::new();
        let mut state = local_state();
        play_all(&engine, &mut state, &[0]);
        let before = state.clone();

        let error = engine
            .play_move(&mut state, MoveAction::human(0))
            .expect_err("cell is taken");

        assert_eq!(error, RuleError::CellOccupied { index: 0 });
        assert_eq!(state, before);
    }

    #[test]
    fn out_of_range_targets_are_rejected() {
        let engine = RuleEngine::new();
        let mut state = local_state();
        assert_eq!(
            engine.play_move(&mut state, MoveAction::human(9)),
            Err(RuleError::InvalidCell { index: 9 })
        );
        assert_eq!(
            engine.play_at(&mut state, 1, 3, MoveOrigin::Human),
            Err(RuleError::InvalidPosition { row: 1, col: 3 })
        );
        assert!(state.board.is_blank());
    }

    #[test]
    fn row_col_moves_use_row_major_indices() {
        let engine = RuleEngine::new();
        let mut state = local_state();
        engine
            .play_at(&mut state, 1, 2, MoveOrigin::Human)
            .expect("move should succeed");
        assert_eq!(state.board.get(5), Some(Marker::X));
    }

    #[test]
    fn winning_move_freezes_board() {
        let engine = RuleEngine::new();
        let mut state = local_state();
        play_all(&engine, &mut state, &[0, 3, 1, 4, 2]);

        assert_eq!(state.phase, GamePhase::Won { winner: Marker::X });
        assert_eq!(state.winning_line, Some([0, 1, 2]));
        assert_eq!(state.status, "X wins! 🎉");
        assert_eq!(state.turn, Marker::X, "turn does not pass after a win");
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].winner, Marker::X);
        assert_eq!(state.history[0].board, state.board);

        assert_eq!(
            engine.play_move(&mut state, MoveAction::human(8)),
            Err(RuleError::GameFinished)
        );
        assert!(state.board.is_empty_cell(8));
        assert!(RuleEngine::validate(&state).is_ok());
    }

    #[test]
    fn full_board_without_line_is_draw() {
        let engine = RuleEngine::new();
        let mut state = local_state();
        // 依次落子得到 XOX/OXX/OXO
        play_all(&engine, &mut state, &[0, 1, 2, 3, 4, 6, 5, 8, 7]);

        assert_eq!(state.phase, GamePhase::Draw);
        assert_eq!(state.status, "Draw! 🤝");
        assert!(state.history.is_empty());
        assert_eq!(state.event_log.last(), Some(&GameEvent::GameDrawn));
        assert!(RuleEngine::validate(&state).is_ok());
    }

    #[test]
    fn reset_toggles_starting_marker_and_keeps_history() {
        let engine = RuleEngine::new();
        let mut state = local_state();
        play_all(&engine, &mut state, &[0, 3, 1, 4, 2]);

        let events = engine.reset(&mut state);

        assert_eq!(events, vec![GameEvent::GameReset { starting: Marker::O }]);
        assert_eq!(state.starting_marker, Marker::O);
        assert_eq!(state.turn, Marker::O);
        assert_eq!(state.phase, GamePhase::InProgress);
        assert_eq!(state.board, Board::new());
        assert_eq!(state.winning_line, None);
        assert_eq!(state.status, "Game restarted!");
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.event_log, events);
        assert!(RuleEngine::validate(&state).is_ok());

        engine.reset(&mut state);
        assert_eq!(state.starting_marker, Marker::X);
    }

    #[test]
    fn history_is_capped() {
        let engine = RuleEngine::new().with_history_limit(2);
        let mut state = local_state();
        for _ in 0..3 {
            let line = match state.starting_marker {
                Marker::X => [0, 3, 1, 4, 2],
                Marker::O => [6, 0, 7, 1, 8],
            };
            play_all(&engine, &mut state, &line);
            engine.reset(&mut state);
        }
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history[0].winner, Marker::X);
        assert_eq!(state.history[1].winner, Marker::O);
    }

    #[test]
    fn single_mode_enforces_ai_turns() {
        let engine = RuleEngine::new();
        let mut state = GameState::new(GameMode::Single);

        assert_eq!(
            engine.play_move(&mut state, MoveAction::ai(0)),
            Err(RuleError::NotAiTurn)
        );
        engine
            .play_move(&mut state, MoveAction::human(4))
            .expect("human opens");
        assert!(state.awaiting_ai());
        assert_eq!(
            engine.play_move(&mut state, MoveAction::human(0)),
            Err(RuleError::AwaitingAi { ai: Marker::O })
        );
        engine
            .play_move(&mut state, MoveAction::ai(0))
            .expect("ai replies");
        assert_eq!(state.board.get(0), Some(Marker::O));
        assert!(!state.awaiting_ai());
    }

    #[test]
    fn contract_mode_lets_both_sides_move_manually() {
        let engine = RuleEngine::new();
        let mut state = GameState::new(GameMode::Contract);
        engine
            .play_at(&mut state, 0, 0, MoveOrigin::Human)
            .expect("player one moves");
        engine
            .play_at(&mut state, 1, 1, MoveOrigin::Human)
            .expect("player two moves");
        assert_eq!(
            engine.play_move(&mut state, MoveAction::ai(2)),
            Err(RuleError::NotAiTurn)
        );
    }

    #[test]
    fn resolution_reports_result() {
        let engine = RuleEngine::new();
        let mut state = local_state();
        play_all(&engine, &mut state, &[0, 3, 1, 4]);
        let events = engine
            .play_move(&mut state, MoveAction::human(2))
            .expect("winning move");
        let resolution = RuleResolution::new(state, events);
        assert_eq!(resolution.result, GameResult::Won { winner: Marker::X });
        assert!(resolution
            .events
            .contains(&GameEvent::GameWon {
                winner: Marker::X,
                line: [0, 1, 2]
            }));
    }
}
