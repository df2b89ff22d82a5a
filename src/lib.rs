pub mod ai;
pub mod game;
pub mod utils;

use std::fmt::Display;
use std::str::FromStr;

use gloo_timers::future::TimeoutFuture;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{
    minimax, random_move, select_move, AiAgent, AiConfig, AiDecision, AiDifficulty,
    SearchOutcome,
};
pub use game::{
    evaluate, winning_line, Board, CellIndex, GameEvent, GameMode, GamePhase, GameResult,
    GameState, HistoryEntry, IntegrityError, Marker, MoveAction, MoveOrigin, Position,
    Preferences, RuleEngine, RuleError, RuleResolution, WinLine, WIN_LINES,
};

/// AI 落子前的默认等待时间，让界面先渲染玩家的一步。
pub const AI_MOVE_DELAY_MS: u32 = 500;

#[cfg(all(feature = "wee_alloc", target_arch = "wasm32"))]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    utils::set_panic_hook();
    utils::init_logger(Some("tictactoe".into()));
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn parse_setting<T: FromStr>(kind: &str, value: &str) -> Result<T, JsValue> {
    T::from_str(value).map_err(|_| JsValue::from_str(&format!("unknown {kind} `{value}`")))
}

fn make_resolution_json(state: &GameState, events: Vec<GameEvent>) -> Result<String, JsValue> {
    serde_json::to_string(&RuleResolution::new(state.clone(), events)).map_err(serde_to_js_error)
}

fn parse_state(json: &str) -> Result<GameState, JsValue> {
    let state: GameState = serde_json::from_str(json).map_err(serde_to_js_error)?;
    RuleEngine::validate(&state).map_err(to_js_error)?;
    Ok(state)
}

#[derive(Serialize)]
struct AiMoveResponse {
    decision: AiDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<RuleResolution>,
}

#[wasm_bindgen]
pub struct TicTacToeEngine {
    state: GameState,
    rules: RuleEngine,
    agent: AiAgent,
}

#[wasm_bindgen]
impl TicTacToeEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(initial_state_json: Option<String>) -> Result<TicTacToeEngine, JsValue> {
        let state = match initial_state_json {
            Some(json) => parse_state(&json)?,
            None => GameState::default(),
        };
        let agent = AiAgent::new(AiConfig::from_difficulty(state.difficulty));
        crate::log!("engine ready: mode {:?}, {} starts", state.mode, state.starting_marker);
        Ok(TicTacToeEngine {
            state,
            rules: RuleEngine::new(),
            agent,
        })
    }

    /// 固定随机种子的引擎，便于复现对局。
    #[wasm_bindgen(js_name = "withSeed")]
    pub fn with_seed(
        initial_state_json: Option<String>,
        seed: u32,
    ) -> Result<TicTacToeEngine, JsValue> {
        let mut engine = TicTacToeEngine::new(initial_state_json)?;
        engine.agent = AiAgent::with_seed(*engine.agent.config(), u64::from(seed));
        Ok(engine)
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state).map_err(serde_to_js_error)
    }

    pub fn set_state_json(&mut self, json: &str) -> Result<(), JsValue> {
        self.state = parse_state(json)?;
        self.agent.set_difficulty(self.state.difficulty);
        Ok(())
    }

    pub fn set_mode(&mut self, mode: &str) -> Result<(), JsValue> {
        let mode: GameMode = parse_setting("mode", mode)?;
        self.state.set_mode(mode);
        Ok(())
    }

    pub fn set_difficulty(&mut self, difficulty: &str) -> Result<(), JsValue> {
        let difficulty: AiDifficulty = parse_setting("difficulty", difficulty)?;
        self.state.set_difficulty(difficulty);
        self.agent.set_difficulty(difficulty);
        Ok(())
    }

    pub fn awaiting_ai(&self) -> bool {
        self.state.awaiting_ai()
    }

    pub fn status(&self) -> String {
        self.state.status.clone()
    }

    pub fn play_move(&mut self, index: u8) -> Result<String, JsValue> {
        self.apply(MoveAction::human(index))
    }

    pub fn play_at(&mut self, row: u8, col: u8) -> Result<String, JsValue> {
        let events = self
            .rules
            .play_at(&mut self.state, row, col, MoveOrigin::Human)
            .map_err(to_js_error)?;
        make_resolution_json(&self.state, events)
    }

    pub fn apply_ai_move(&mut self, difficulty: Option<String>) -> Result<String, JsValue> {
        if !self.state.awaiting_ai() {
            return Err(to_js_error(RuleError::NotAiTurn));
        }
        let difficulty = self.resolve_difficulty(difficulty)?;
        self.agent.set_difficulty(difficulty);

        let decision = self.agent.decide_move(
            &self.state.board,
            self.state.turn,
            self.state.starting_marker,
        );
        let applied = match decision.cell {
            Some(cell) => {
                let events = self
                    .rules
                    .play_move(&mut self.state, MoveAction::ai(cell))
                    .map_err(to_js_error)?;
                Some(RuleResolution::new(self.state.clone(), events))
            }
            None => None,
        };

        let response = AiMoveResponse { decision, applied };
        serde_json::to_string(&response).map_err(serde_to_js_error)
    }

    /// 延迟后在当前局面上计算 AI 决策，只返回决策不落子；
    /// 前端拿到 `cell` 后通过 `apply_ai_cell` 提交。
    pub fn think_ai(&mut self, difficulty: Option<String>, delay_ms: Option<u32>) -> Promise {
        let board = self.state.board;
        let turn = self.state.turn;
        let starting = self.state.starting_marker;
        let difficulty = match self.resolve_difficulty(difficulty) {
            Ok(difficulty) => difficulty,
            Err(error) => return Promise::reject(&error),
        };
        let delay = delay_ms.unwrap_or(AI_MOVE_DELAY_MS);
        let mut agent = self.agent.fork();
        agent.set_difficulty(difficulty);

        future_to_promise(async move {
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            let decision = agent.decide_move(&board, turn, starting);
            let json = serde_json::to_string(&decision).map_err(serde_to_js_error)?;
            Ok(JsValue::from_str(&json))
        })
    }

    /// 提交 `think_ai` 算出的格子，按 AI 一方落子。
    pub fn apply_ai_cell(&mut self, index: u8) -> Result<String, JsValue> {
        self.apply(MoveAction::ai(index))
    }

    pub fn reset(&mut self) -> Result<String, JsValue> {
        let events = self.rules.reset(&mut self.state);
        make_resolution_json(&self.state, events)
    }

    pub fn history_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state.history).map_err(serde_to_js_error)
    }

    /// 恢复前端持久化的历史记录（如 localStorage）。
    pub fn load_history_json(&mut self, json: &str) -> Result<(), JsValue> {
        let mut history: Vec<HistoryEntry> =
            serde_json::from_str(json).map_err(serde_to_js_error)?;
        history.truncate(game::state::HISTORY_LIMIT);
        self.state.history = history;
        Ok(())
    }

    pub fn preferences_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state.preferences).map_err(serde_to_js_error)
    }

    pub fn set_preferences_json(&mut self, json: &str) -> Result<(), JsValue> {
        self.state.preferences = serde_json::from_str(json).map_err(serde_to_js_error)?;
        Ok(())
    }

    fn resolve_difficulty(&self, difficulty: Option<String>) -> Result<AiDifficulty, JsValue> {
        match difficulty {
            Some(value) => parse_setting("difficulty", &value),
            None => Ok(self.state.difficulty),
        }
    }

    fn apply(&mut self, action: MoveAction) -> Result<String, JsValue> {
        let events = self
            .rules
            .play_move(&mut self.state, action)
            .map_err(to_js_error)?;
        make_resolution_json(&self.state, events)
    }
}

/// 返回一个新的游戏状态，方便前端初始化。
#[wasm_bindgen(js_name = "createGameState")]
pub fn create_game_state(mode: Option<String>) -> Result<JsValue, JsValue> {
    let mode = match mode {
        Some(value) => parse_setting("mode", &value)?,
        None => GameMode::default(),
    };
    to_value(&GameState::new(mode)).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "evaluateBoard")]
pub fn evaluate_board(board: JsValue) -> Result<JsValue, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    to_value(&evaluate(&board)).map_err(JsValue::from)
}

/// 返回获胜连线的三个格子索引，没有获胜方时返回 `undefined`。
#[wasm_bindgen(js_name = "winningLine")]
pub fn winning_line_of(board: JsValue) -> Result<JsValue, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    let line = winning_line(&board).map(|(_, line)| line);
    to_value(&line).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "selectMove")]
pub fn select_move_js(
    board: JsValue,
    turn: &str,
    starting: &str,
    difficulty: Option<String>,
    seed: Option<u32>,
) -> Result<Option<u8>, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    let turn: Marker = parse_setting("marker", turn)?;
    let starting: Marker = parse_setting("marker", starting)?;
    let difficulty = match difficulty {
        Some(value) => parse_setting("difficulty", &value)?,
        None => AiDifficulty::default(),
    };
    let mut rng = match seed {
        Some(seed) => SmallRng::seed_from_u64(u64::from(seed)),
        None => SmallRng::from_entropy(),
    };
    Ok(select_move(&board, turn, starting, difficulty, &mut rng))
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    RuleEngine::validate(&state).map_err(to_js_error)
}
