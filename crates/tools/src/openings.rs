//! 開始局面ファイルの読み込み
//!
//! 1行1局面。`#` で始まる行と空行は無視する。書式:
//!
//! ```text
//! startpos
//! startpos moves b2 a1
//! fen x../.o./... moves c3
//! x../.o./...
//! ```

use std::io::BufRead;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use zeroplay_core::Opening;
use zeroplay_core::board::Position;
use zeroplay_core::tree::GameTree;

/// 開始局面行を分解した結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpeningLine {
    /// `None` は初期局面
    pub fen: Option<String>,
    pub moves: Vec<String>,
}

impl OpeningLine {
    /// 盤面実装の局面として解釈し、強制手順の合法性を確かめる
    pub fn build<P>(&self, startpos: &str) -> Result<Opening<P::Move>>
    where
        P: Position,
        P::Move: FromStr,
        <P::Move as FromStr>::Err: std::error::Error + Send + Sync + 'static,
    {
        let fen = self.fen.as_deref().unwrap_or(startpos);
        let moves = self
            .moves
            .iter()
            .map(|mv| mv.parse::<P::Move>().with_context(|| format!("invalid move '{mv}'")))
            .collect::<Result<Vec<_>>>()?;
        GameTree::<P>::from_fen(fen, &moves)?;
        Ok(Opening::new(fen, moves))
    }

    pub fn describe(&self) -> String {
        let mut out = match &self.fen {
            Some(fen) => format!("fen {fen}"),
            None => "startpos".to_string(),
        };
        if !self.moves.is_empty() {
            out.push_str(" moves ");
            out.push_str(&self.moves.join(" "));
        }
        out
    }
}

/// `moves` の手前までを局面文字列として取り出す
fn take_fen<'a, I: Iterator<Item = &'a str>>(tokens: &mut std::iter::Peekable<I>) -> String {
    let mut fen_tokens = Vec::new();
    while let Some(token) = tokens.next_if(|&t| t != "moves") {
        fen_tokens.push(token);
    }
    fen_tokens.join(" ")
}

/// 1行をパースする
pub fn parse_opening_line(line: &str) -> Result<OpeningLine> {
    let mut tokens = line.split_whitespace().peekable();
    let fen = match tokens.peek().copied() {
        None => bail!("empty opening line"),
        Some("startpos") => {
            tokens.next();
            None
        }
        Some("fen") => {
            tokens.next();
            let fen = take_fen(&mut tokens);
            if fen.is_empty() {
                bail!("missing fen payload");
            }
            Some(fen)
        }
        // 局面文字列だけの行
        Some(_) => Some(take_fen(&mut tokens)),
    };
    let moves = match tokens.next() {
        Some("moves") => tokens.map(str::to_string).collect(),
        Some(other) => bail!("expected 'moves' before move list, got '{other}'"),
        None => Vec::new(),
    };
    Ok(OpeningLine { fen, moves })
}

/// 読み込み元から開始局面を読む
pub fn read_openings<R: BufRead>(reader: R) -> Result<Vec<OpeningLine>> {
    let mut openings = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let parsed = parse_opening_line(trimmed)
            .with_context(|| format!("invalid opening on line {}: {}", idx + 1, trimmed))?;
        openings.push(parsed);
    }
    Ok(openings)
}

/// 開始局面群をファイル / 単一局面 / 初期局面 から読む
pub fn load_openings(file: Option<&Path>, fen: Option<&str>) -> Result<Vec<OpeningLine>> {
    match (file, fen) {
        (Some(_), Some(_)) => bail!("--openings and --fen cannot be used together"),
        (Some(path), None) => {
            let reader = crate::common::io::open_reader(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let openings = read_openings(reader)
                .with_context(|| format!("failed to read {}", path.display()))?;
            if openings.is_empty() {
                bail!("no usable openings found in {}", path.display());
            }
            Ok(openings)
        }
        (None, Some(line)) => Ok(vec![parse_opening_line(line)?]),
        (None, None) => Ok(vec![OpeningLine {
            fen: None,
            moves: Vec::new(),
        }]),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zeroplay_core::board::tictactoe::{STARTPOS, Square, TicTacToe};

    use super::*;

    #[test]
    fn test_parse_line_forms() {
        let parsed = parse_opening_line("startpos moves b2 a1").unwrap();
        assert_eq!(parsed.fen, None);
        assert_eq!(parsed.moves, vec!["b2", "a1"]);

        let parsed = parse_opening_line("fen x../.o./... moves c3").unwrap();
        assert_eq!(parsed.fen.as_deref(), Some("x../.o./..."));
        assert_eq!(parsed.describe(), "fen x../.o./... moves c3");

        let parsed = parse_opening_line("x../.o./...").unwrap();
        assert_eq!(parsed.fen.as_deref(), Some("x../.o./..."));
        assert!(parsed.moves.is_empty());

        assert!(parse_opening_line("startpos b2").is_err());
        assert!(parse_opening_line("fen moves b2").is_err());
    }

    #[test]
    fn test_build_validates_moves() {
        let line = parse_opening_line("startpos moves b2 a1").unwrap();
        let opening = line.build::<TicTacToe>(STARTPOS).unwrap();
        assert_eq!(opening.start_fen, STARTPOS);
        assert_eq!(opening.moves, vec![Square::parse("b2").unwrap(), Square::parse("a1").unwrap()]);

        let illegal = parse_opening_line("startpos moves b2 b2").unwrap();
        assert!(illegal.build::<TicTacToe>(STARTPOS).is_err());
        let garbage = parse_opening_line("startpos moves z9").unwrap();
        assert!(garbage.build::<TicTacToe>(STARTPOS).is_err());
    }

    #[test]
    fn test_load_file_skips_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# openings").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "startpos").unwrap();
        writeln!(file, "fen .../.x./... moves a1").unwrap();
        file.flush().unwrap();

        let openings = load_openings(Some(file.path()), None).unwrap();
        assert_eq!(openings.len(), 2);
        assert_eq!(openings[1].moves, vec!["a1"]);

        assert!(load_openings(Some(file.path()), Some("startpos")).is_err());
        assert_eq!(load_openings(None, None).unwrap()[0].describe(), "startpos");
    }
}
