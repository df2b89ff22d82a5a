use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

pub const CELL_COUNT: usize = 9;
pub const BOARD_SIDE: u8 = 3;

/// 棋盘格索引，index = row * 3 + col。
pub type CellIndex = u8;
/// 一条三连线上的三个格子。
pub type WinLine = [CellIndex; 3];

/// 判定顺序固定：三行、三列、两条对角线。链上合约使用同一组连线。
pub const WIN_LINES: [WinLine; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Marker {
    #[default]
    X,
    O,
}

impl Marker {
    pub fn opponent(self) -> Self {
        match self {
            Marker::X => Marker::O,
            Marker::O => Marker::X,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Marker::X => "X",
            Marker::O => "O",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Marker {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "X" => Ok(Marker::X),
            "O" => Ok(Marker::O),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type")]
pub enum GameResult {
    #[default]
    InProgress,
    Won {
        winner: Marker,
    },
    Draw,
}

impl GameResult {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GameResult::InProgress)
    }

    pub fn winner(&self) -> Option<Marker> {
        match self {
            GameResult::Won { winner } => Some(*winner),
            _ => None,
        }
    }
}

/// 行列坐标，合约以 (row, col) 提交落子。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Position {
    pub row: u8,
    pub col: u8,
}

impl Position {
    pub fn new(row: u8, col: u8) -> Option<Self> {
        if row < BOARD_SIDE && col < BOARD_SIDE {
            Some(Self { row, col })
        } else {
            None
        }
    }

    pub fn from_index(index: CellIndex) -> Option<Self> {
        if usize::from(index) < CELL_COUNT {
            Some(Self {
                row: index / BOARD_SIDE,
                col: index % BOARD_SIDE,
            })
        } else {
            None
        }
    }

    pub fn index(self) -> CellIndex {
        self.row * BOARD_SIDE + self.col
    }
}

/// 3x3 棋盘。序列化为长度为 9 的数组，空格为 `null`；
/// 反序列化时也接受前端使用的空字符串。
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(transparent)]
pub struct Board {
    cells: [Option<Marker>; CELL_COUNT],
}

impl<'de> Deserialize<'de> for Board {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Vec::<Option<String>>::deserialize(deserializer)?;
        if raw.len() != CELL_COUNT {
            return Err(de::Error::invalid_length(raw.len(), &"9 cells"));
        }
        let mut cells = [None; CELL_COUNT];
        for (slot, value) in cells.iter_mut().zip(raw) {
            *slot = match value.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(text) => Some(text.parse::<Marker>().map_err(|_| {
                    <D::Error as de::Error>::custom(format!("unknown marker `{text}`"))
                })?),
            };
        }
        Ok(Self { cells })
    }
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells(cells: [Option<Marker>; CELL_COUNT]) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Option<Marker>; CELL_COUNT] {
        &self.cells
    }

    pub fn get(&self, index: CellIndex) -> Option<Marker> {
        self.cells.get(usize::from(index)).copied().flatten()
    }

    pub fn is_empty_cell(&self, index: CellIndex) -> bool {
        matches!(self.cells.get(usize::from(index)), Some(None))
    }

    /// 直接写格子，不做任何规则校验。规则层负责保证已占用的格子不被覆盖。
    pub fn set(&mut self, index: CellIndex, cell: Option<Marker>) {
        if let Some(slot) = self.cells.get_mut(usize::from(index)) {
            *slot = cell;
        }
    }

    pub fn empty_cells(&self) -> Vec<CellIndex> {
        (0..CELL_COUNT as CellIndex)
            .filter(|&index| self.is_empty_cell(index))
            .collect()
    }

    pub fn count(&self, marker: Marker) -> usize {
        self.cells
            .iter()
            .filter(|cell| **cell == Some(marker))
            .count()
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, cell) in self.cells.iter().enumerate() {
            if index > 0 && index % usize::from(BOARD_SIDE) == 0 {
                f.write_str("/")?;
            }
            f.write_str(cell.map(Marker::as_str).unwrap_or("_"))?;
        }
        Ok(())
    }
}

/// 解析 `"XX_OO____"` 形式的棋盘，`_` 或 `.` 表示空格，`/` 与空白被忽略。
impl FromStr for Board {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut cells = [None; CELL_COUNT];
        let mut filled = 0;
        for ch in s.chars().filter(|ch| !ch.is_whitespace() && *ch != '/') {
            let slot = cells.get_mut(filled).ok_or(())?;
            *slot = match ch {
                'X' | 'x' => Some(Marker::X),
                'O' | 'o' => Some(Marker::O),
                '_' | '.' => None,
                _ => return Err(()),
            };
            filled += 1;
        }
        if filled != CELL_COUNT {
            return Err(());
        }
        Ok(Self { cells })
    }
}

/// 返回第一条被同一方占满的连线。
pub fn winning_line(board: &Board) -> Option<(Marker, WinLine)> {
    WIN_LINES.iter().find_map(|&line| {
        let [a, b, c] = line;
        let marker = board.get(a)?;
        (board.get(b) == Some(marker) && board.get(c) == Some(marker)).then_some((marker, line))
    })
}

pub fn evaluate(board: &Board) -> GameResult {
    if let Some((winner, _)) = winning_line(board) {
        return GameResult::Won { winner };
    }
    if board.is_full() {
        GameResult::Draw
    } else {
        GameResult::InProgress
    }
}
