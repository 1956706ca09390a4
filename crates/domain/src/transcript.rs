//! Portable game notation (PGN) transcript of one game.
//!
//! Headers are rendered as `[Key "Value"]` pairs with JSON-escaped values,
//! followed by SAN movetext. Result and Termination are written by
//! [`TranscriptRecorder::finalize`] only, once, when the game concludes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::board::{Board, ChessMove, Side};
use crate::error::DomainError;
use crate::outcome::GameResult;

const LINE_WIDTH: usize = 80;

/// Known header tags, in render order. The first seven form the PGN
/// seven-tag roster and are always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagKey {
    Event,
    Site,
    Date,
    Round,
    White,
    Black,
    Result,
    Time,
    Mode,
    Termination,
    Fen,
    SetUp,
}

impl TagKey {
    pub const ALL: [TagKey; 12] = [
        TagKey::Event,
        TagKey::Site,
        TagKey::Date,
        TagKey::Round,
        TagKey::White,
        TagKey::Black,
        TagKey::Result,
        TagKey::Time,
        TagKey::Mode,
        TagKey::Termination,
        TagKey::Fen,
        TagKey::SetUp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "Event",
            Self::Site => "Site",
            Self::Date => "Date",
            Self::Round => "Round",
            Self::White => "White",
            Self::Black => "Black",
            Self::Result => "Result",
            Self::Time => "Time",
            Self::Mode => "Mode",
            Self::Termination => "Termination",
            Self::Fen => "FEN",
            Self::SetUp => "SetUp",
        }
    }

    fn roster_default(&self) -> Option<&'static str> {
        match self {
            Self::Date => Some("????.??.??"),
            Self::Result => Some("*"),
            Self::Event | Self::Site | Self::Round | Self::White | Self::Black => Some("?"),
            _ => None,
        }
    }

    fn is_reserved(&self) -> bool {
        matches!(self, Self::Result | Self::Termination)
    }
}

#[derive(Debug, Clone)]
struct RecordedMove {
    number: u32,
    side: Side,
    san: String,
    uci: ChessMove,
}

/// Append-only record of one game.
#[derive(Debug, Clone, Default)]
pub struct TranscriptRecorder {
    tags: BTreeMap<TagKey, String>,
    moves: Vec<RecordedMove>,
    finalized: bool,
}

impl TranscriptRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder for a game starting at `board`'s current position. A
    /// non-standard start is recorded in the FEN/SetUp headers.
    pub fn for_board(board: &Board) -> Self {
        let mut recorder = Self::new();
        if !board.is_standard_start() {
            recorder.tags.insert(TagKey::Fen, board.start_fen().to_string());
            recorder.tags.insert(TagKey::SetUp, "1".to_string());
        }
        recorder
    }

    pub fn add_header(&mut self, key: TagKey, value: impl Into<String>) -> Result<(), DomainError> {
        if key.is_reserved() {
            return Err(DomainError::ReservedTag(key.as_str()));
        }
        if self.finalized {
            return Err(DomainError::TranscriptFinalized);
        }
        self.tags.insert(key, value.into());
        Ok(())
    }

    /// Date and Time headers, PGN style (`YYYY.MM.DD`, `HH:MM:SS`).
    pub fn record_start_time(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        self.add_header(TagKey::Date, at.format("%Y.%m.%d").to_string())?;
        self.add_header(TagKey::Time, at.format("%H:%M:%S").to_string())
    }

    /// Record `mv`, which must be legal on `board_before`.
    pub fn add_move(&mut self, board_before: &Board, mv: &ChessMove) -> Result<(), DomainError> {
        if self.finalized {
            return Err(DomainError::TranscriptFinalized);
        }
        let san = board_before.san(mv)?;
        self.moves.push(RecordedMove {
            number: board_before.fullmove_number(),
            side: board_before.turn(),
            san,
            uci: mv.clone(),
        });
        Ok(())
    }

    pub fn finalize(&mut self, result: GameResult, termination: &str) -> Result<(), DomainError> {
        if self.finalized {
            return Err(DomainError::TranscriptFinalized);
        }
        self.tags.insert(TagKey::Result, result.as_str().to_string());
        self.tags.insert(TagKey::Termination, termination.to_string());
        self.finalized = true;
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn header(&self, key: TagKey) -> Option<&str> {
        self.tags.get(&key).map(String::as_str)
    }

    /// Recorded moves in UCI notation, oldest first.
    pub fn moves(&self) -> impl Iterator<Item = &ChessMove> {
        self.moves.iter().map(|m| &m.uci)
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Render the full PGN text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for key in TagKey::ALL {
            let value = match (self.tags.get(&key), key.roster_default()) {
                (Some(value), _) => value.as_str(),
                (None, Some(default)) => default,
                (None, None) => continue,
            };
            out.push('[');
            out.push_str(key.as_str());
            out.push(' ');
            out.push_str(&escape_value(value));
            out.push_str("]\n");
        }
        out.push('\n');
        out.push_str(&self.movetext());
        out.push('\n');
        out
    }

    fn movetext(&self) -> String {
        let mut tokens = Vec::with_capacity(self.moves.len() * 2 + 1);
        for (i, m) in self.moves.iter().enumerate() {
            match m.side {
                Side::White => tokens.push(format!("{}.", m.number)),
                Side::Black if i == 0 => tokens.push(format!("{}...", m.number)),
                Side::Black => {}
            }
            tokens.push(m.san.clone());
        }
        tokens.push(
            self.header(TagKey::Result)
                .unwrap_or("*")
                .to_string(),
        );

        let mut text = String::new();
        let mut line_len = 0;
        for token in tokens {
            if line_len > 0 && line_len + 1 + token.len() > LINE_WIDTH {
                text.push('\n');
                line_len = 0;
            } else if line_len > 0 {
                text.push(' ');
                line_len += 1;
            }
            line_len += token.len();
            text.push_str(&token);
        }
        text
    }
}

fn escape_value(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

/// Read back the tag pairs at the head of a PGN text, unescaping values.
/// Pairs may be one per line or concatenated; parsing stops at the first
/// token that is not a tag pair.
pub fn parse_tags(text: &str) -> Vec<(String, String)> {
    let mut tags = Vec::new();
    let mut rest = text.trim_start();

    while let Some(body) = rest.strip_prefix('[') {
        let Some((key, after_key)) = body.split_once(' ') else {
            break;
        };
        let mut values = serde_json::Deserializer::from_str(after_key).into_iter::<String>();
        let Some(Ok(value)) = values.next() else {
            break;
        };
        let consumed = values.byte_offset();
        let Some(after) = after_key[consumed..].trim_start().strip_prefix(']') else {
            break;
        };
        tags.push((key.to_string(), value));
        rest = after.trim_start();
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn mv(s: &str) -> ChessMove {
        s.parse().unwrap()
    }

    fn record(moves: &[&str]) -> (Board, TranscriptRecorder) {
        let mut board = Board::new();
        let mut transcript = TranscriptRecorder::for_board(&board);
        for m in moves {
            let m = mv(m);
            transcript.add_move(&board, &m).unwrap();
            board.apply(&m).unwrap();
        }
        (board, transcript)
    }

    #[test]
    fn empty_transcript_renders_roster_defaults() {
        let text = TranscriptRecorder::new().render();
        assert_eq!(
            text,
            "[Event \"?\"]\n[Site \"?\"]\n[Date \"????.??.??\"]\n[Round \"?\"]\n\
             [White \"?\"]\n[Black \"?\"]\n[Result \"*\"]\n\n*\n"
        );
    }

    #[test]
    fn renders_numbered_san_movetext() {
        let (_, mut transcript) = record(&["e2e4", "e7e5", "d1h5", "b8c6", "f1c4", "g8f6", "h5f7"]);
        transcript.finalize(GameResult::WhiteWins, "normal").unwrap();

        let text = transcript.render();
        assert!(text.ends_with("\n1. e4 e5 2. Qh5 Nc6 3. Bc4 Nf6 4. Qxf7# 1-0\n"));
        assert!(text.contains("[Result \"1-0\"]\n"));
        assert!(text.contains("[Termination \"normal\"]\n"));
    }

    #[test]
    fn black_to_move_start_uses_ellipsis() {
        let mut board = Board::from_fen("4k3/8/8/8/8/8/4P3/4K3 b - - 0 12").unwrap();
        let mut transcript = TranscriptRecorder::for_board(&board);
        for m in ["e8d7", "e2e4"] {
            let m = mv(m);
            transcript.add_move(&board, &m).unwrap();
            board.apply(&m).unwrap();
        }
        let text = transcript.render();
        assert!(text.contains("[FEN \"4k3/8/8/8/8/8/4P3/4K3 b - - 0 12\"]\n[SetUp \"1\"]\n"));
        assert!(text.ends_with("\n12... Kd7 13. e4 *\n"));
    }

    #[test]
    fn long_games_wrap_at_eighty_columns() {
        let shuffle = ["g1f3", "g8f6", "f3g1", "f6g8"];
        let moves: Vec<&str> = shuffle.iter().cycle().take(40).copied().collect();
        let (_, transcript) = record(&moves);
        let text = transcript.render();
        let movetext = text.split("\n\n").nth(1).unwrap();
        assert!(movetext.lines().count() > 1);
        assert!(movetext.lines().all(|line| line.len() <= LINE_WIDTH));
    }

    #[test]
    fn header_values_round_trip_through_escaping() {
        let mut transcript = TranscriptRecorder::new();
        let tricky = "Giri, \"Anish\" \\ the \u{1}bot\n";
        transcript.add_header(TagKey::Black, tricky).unwrap();
        transcript.add_header(TagKey::Site, "https://chess.example").unwrap();
        transcript
            .record_start_time(Utc.with_ymd_and_hms(2024, 3, 9, 17, 5, 0).unwrap())
            .unwrap();

        let text = transcript.render();
        let tags = parse_tags(&text);

        assert!(tags.contains(&("Black".to_string(), tricky.to_string())));
        assert!(tags.contains(&("Site".to_string(), "https://chess.example".to_string())));
        assert!(tags.contains(&("Date".to_string(), "2024.03.09".to_string())));
        assert!(tags.contains(&("Time".to_string(), "17:05:00".to_string())));
        // Control characters never reach the output raw.
        assert!(!text.contains('\u{1}'));
    }

    #[test]
    fn parse_tags_accepts_concatenated_pairs() {
        let tags = parse_tags("[Event \"a]b\"][Round \"-\"]\n\n1. e4 *");
        assert_eq!(
            tags,
            vec![
                ("Event".to_string(), "a]b".to_string()),
                ("Round".to_string(), "-".to_string()),
            ]
        );
    }

    #[test]
    fn outcome_headers_are_reserved_for_finalize() {
        let mut transcript = TranscriptRecorder::new();
        assert_eq!(
            transcript.add_header(TagKey::Result, "1-0"),
            Err(DomainError::ReservedTag("Result"))
        );
        assert_eq!(
            transcript.add_header(TagKey::Termination, "normal"),
            Err(DomainError::ReservedTag("Termination"))
        );
        assert_eq!(transcript.header(TagKey::Result), None);
    }

    #[test]
    fn finalize_twice_is_an_error() {
        let mut transcript = TranscriptRecorder::new();
        transcript.finalize(GameResult::Draw, "normal").unwrap();
        assert_eq!(
            transcript.finalize(GameResult::WhiteWins, "normal"),
            Err(DomainError::TranscriptFinalized)
        );
        assert_eq!(transcript.header(TagKey::Result), Some("1/2-1/2"));
    }

    #[test]
    fn moves_after_finalize_are_rejected() {
        let (board, mut transcript) = record(&["e2e4"]);
        transcript.finalize(GameResult::Draw, "normal").unwrap();
        assert_eq!(
            transcript.add_move(&board, &mv("e7e5")),
            Err(DomainError::TranscriptFinalized)
        );
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn replaying_recorded_moves_reproduces_every_position() {
        let moves = ["d2d4", "d7d5", "c2c4", "e7e6", "b1c3", "g8f6", "c1g5", "f8e7"];
        let mut live = Board::new();
        let mut transcript = TranscriptRecorder::for_board(&live);
        let mut fens = Vec::new();
        for m in moves {
            let m = mv(m);
            transcript.add_move(&live, &m).unwrap();
            live.apply(&m).unwrap();
            fens.push(live.fen());
        }

        let recorded: Vec<ChessMove> = transcript.moves().cloned().collect();
        assert_eq!(recorded.len(), moves.len());
        for k in 1..=recorded.len() {
            let mut replay = Board::new();
            for m in &recorded[..k] {
                replay.apply(m).unwrap();
            }
            assert_eq!(replay.fen(), fens[k - 1]);
        }
    }

    #[test]
    fn illegal_move_is_not_recorded() {
        let board = Board::new();
        let mut transcript = TranscriptRecorder::for_board(&board);
        assert!(transcript.add_move(&board, &mv("e2e5")).is_err());
        assert!(transcript.is_empty());
    }
}
