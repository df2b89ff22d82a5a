use std::fmt;
use std::str::FromStr;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::game::{evaluate, Board, CellIndex, GameResult, Marker};
use crate::utils::now_ms;

const WIN_SCORE: i32 = 10;

pub const MEDIUM_DEPTH: u8 = 3;
pub const HARD_DEPTH: u8 = 6;
pub const MEDIUM_RANDOM_CHANCE: f64 = 0.3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AiDifficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl AiDifficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            AiDifficulty::Easy => "easy",
            AiDifficulty::Medium => "medium",
            AiDifficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for AiDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AiDifficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(AiDifficulty::Easy),
            "medium" | "normal" => Ok(AiDifficulty::Medium),
            "hard" | "expert" => Ok(AiDifficulty::Hard),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AiConfig {
    pub difficulty: AiDifficulty,
    /// 搜索深度上限（层数），到达上限的非终局局面记 0 分。
    pub depth: u8,
    /// 放弃搜索、直接随机落子的概率。
    pub random_move_chance: f64,
}

impl AiConfig {
    pub fn from_difficulty(difficulty: AiDifficulty) -> Self {
        match difficulty {
            AiDifficulty::Easy => Self {
                difficulty,
                depth: 1,
                random_move_chance: 1.0,
            },
            AiDifficulty::Medium => Self {
                difficulty,
                depth: MEDIUM_DEPTH,
                random_move_chance: MEDIUM_RANDOM_CHANCE,
            },
            AiDifficulty::Hard => Self {
                difficulty,
                depth: HARD_DEPTH,
                random_move_chance: 0.0,
            },
        }
    }

    pub fn with_depth(mut self, depth: u8) -> Self {
        self.depth = depth.max(1);
        self
    }

    pub fn with_random_move_chance(mut self, chance: f64) -> Self {
        self.random_move_chance = if chance.is_nan() {
            0.0
        } else {
            chance.clamp(0.0, 1.0)
        };
        self
    }

    fn rolls_random<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        match self.random_move_chance {
            chance if chance <= 0.0 => false,
            chance if chance >= 1.0 => true,
            chance => rng.gen_bool(chance),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig::from_difficulty(AiDifficulty::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiDecision {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell: Option<CellIndex>,
    /// 站在落子方视角的搜索分数，随机落子时为 0。
    pub evaluation: i32,
    pub nodes: u64,
    pub depth: u8,
    pub random: bool,
    pub difficulty: AiDifficulty,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOutcome {
    /// 以先手方为正的分数。
    pub score: i32,
    pub best_move: Option<CellIndex>,
    pub nodes: u64,
}

struct Minimax {
    max_depth: u8,
    starting: Marker,
    nodes: u64,
}

impl Minimax {
    fn search(
        &mut self,
        board: &mut Board,
        depth: u8,
        maximizing: bool,
        current: Marker,
    ) -> (i32, Option<CellIndex>) {
        self.nodes += 1;
        let plies = i32::from(self.max_depth.saturating_sub(depth));

        match evaluate(board) {
            GameResult::Won { winner } if winner == self.starting => {
                return (WIN_SCORE - plies, None)
            }
            GameResult::Won { .. } => return (-WIN_SCORE + plies, None),
            GameResult::Draw => return (0, None),
            GameResult::InProgress => {}
        }
        if depth == 0 {
            return (0, None);
        }

        let mut best_score = if maximizing { i32::MIN } else { i32::MAX };
        let mut best_move = None;

        for index in board.empty_cells() {
            board.set(index, Some(current));
            let (score, _) = self.search(board, depth - 1, !maximizing, current.opponent());
            board.set(index, None);

            // 只有严格更优才替换，平分时保留扫描顺序中最早的格子。
            let improves = if maximizing {
                score > best_score
            } else {
                score < best_score
            };
            if improves {
                best_score = score;
                best_move = Some(index);
            }
        }

        (best_score, best_move)
    }
}

/// 有界 minimax。先手方获胜为正分，越早获胜分越高；
/// 轮到先手方时取最大值，否则取最小值。传入的棋盘不会被修改。
pub fn minimax(board: &Board, max_depth: u8, turn: Marker, starting: Marker) -> SearchOutcome {
    let mut scratch = *board;
    let mut search = Minimax {
        max_depth,
        starting,
        nodes: 0,
    };
    let (score, best_move) = search.search(&mut scratch, max_depth, turn == starting, turn);
    SearchOutcome {
        score,
        best_move,
        nodes: search.nodes,
    }
}

pub fn random_move<R: Rng + ?Sized>(board: &Board, rng: &mut R) -> Option<CellIndex> {
    board.empty_cells().choose(rng).copied()
}

struct MovePlan {
    cell: Option<CellIndex>,
    evaluation: i32,
    nodes: u64,
    depth: u8,
    random: bool,
}

fn plan_move<R: Rng + ?Sized>(
    board: &Board,
    turn: Marker,
    starting: Marker,
    config: &AiConfig,
    rng: &mut R,
) -> MovePlan {
    if evaluate(board).is_terminal() {
        return MovePlan {
            cell: None,
            evaluation: 0,
            nodes: 0,
            depth: 0,
            random: false,
        };
    }

    if config.rolls_random(rng) {
        return MovePlan {
            cell: random_move(board, rng),
            evaluation: 0,
            nodes: 0,
            depth: 0,
            random: true,
        };
    }

    let outcome = minimax(board, config.depth, turn, starting);
    let evaluation = if turn == starting {
        outcome.score
    } else {
        -outcome.score
    };
    MovePlan {
        cell: outcome.best_move,
        evaluation,
        nodes: outcome.nodes,
        depth: config.depth,
        random: false,
    }
}

/// 按难度为 `turn` 选择落子。终局棋盘返回 `None`。
pub fn select_move<R: Rng + ?Sized>(
    board: &Board,
    turn: Marker,
    starting: Marker,
    difficulty: AiDifficulty,
    rng: &mut R,
) -> Option<CellIndex> {
    plan_move(board, turn, starting, &AiConfig::from_difficulty(difficulty), rng).cell
}

#[derive(Debug, Clone)]
pub struct AiAgent {
    config: AiConfig,
    rng: SmallRng,
}

impl AiAgent {
    pub fn new(config: AiConfig) -> Self {
        Self {
            config,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(config: AiConfig, seed: u64) -> Self {
        Self {
            config,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    pub fn set_difficulty(&mut self, difficulty: AiDifficulty) {
        self.config = AiConfig::from_difficulty(difficulty);
    }

    /// 派生一个独立随机流的副本，供异步任务使用。
    pub fn fork(&mut self) -> Self {
        let seed = self.rng.gen();
        Self::with_seed(self.config, seed)
    }

    pub fn decide_move(&mut self, board: &Board, turn: Marker, starting: Marker) -> AiDecision {
        let start = now_ms();
        let plan = plan_move(board, turn, starting, &self.config, &mut self.rng);
        let duration_ms = (now_ms() - start).max(0.0) as u64;

        crate::log!(
            "ai {} ({}) -> {:?}, random={}, nodes={}, {}ms",
            turn,
            self.config.difficulty,
            plan.cell,
            plan.random,
            plan.nodes,
            duration_ms
        );

        AiDecision {
            cell: plan.cell,
            evaluation: plan.evaluation,
            nodes: plan.nodes,
            depth: plan.depth,
            random: plan.random,
            difficulty: self.config.difficulty,
            duration_ms,
        }
    }
}
