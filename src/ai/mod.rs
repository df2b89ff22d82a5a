//! AI 落子模块：随机与有界 minimax 搜索。

pub mod minimax;

pub use minimax::{
    minimax, random_move, select_move, AiAgent, AiConfig, AiDecision, AiDifficulty,
    SearchOutcome,
};
