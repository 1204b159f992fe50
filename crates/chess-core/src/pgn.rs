//! PGN utilities: a lightweight regex-based reader and a movetext writer.

use std::sync::LazyLock;

use regex::Regex;

use crate::rules::STANDARD_START_FEN;

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[(\w+)\s+"([^"]*)"\]"#).expect("valid header regex"));
static HEADER_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("valid header line regex"));
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]*\}|;[^\n]*").expect("valid comment regex"));
static VARIATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^()]*\)").expect("valid variation regex"));
static MOVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=[QRBN])?[+#]?|O-O-O[+#]?|O-O[+#]?")
        .expect("valid move regex")
});

/// A PGN game reduced to its tag pairs and mainline SAN tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PgnGame {
    /// Tag pairs in source order
    pub headers: Vec<(String, String)>,
    /// Mainline moves in SAN, check markers included
    pub moves: Vec<String>,
}

impl PgnGame {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Starting FEN declared by the `FEN` tag, if any.
    pub fn start_fen(&self) -> Option<&str> {
        self.header("FEN").filter(|fen| !fen.trim().is_empty())
    }
}

/// Parse a PGN string into headers and SAN moves.
pub fn parse_pgn(pgn: &str) -> PgnGame {
    let headers = HEADER_RE
        .captures_iter(pgn)
        .map(|cap| (cap[1].to_string(), cap[2].to_string()))
        .collect();

    PgnGame {
        headers,
        moves: extract_moves(pgn),
    }
}

/// Extract SAN moves from PGN text (after removing headers, comments, variations).
fn extract_moves(pgn: &str) -> Vec<String> {
    let no_headers = HEADER_LINE_RE.replace_all(pgn, "");
    let mut text = COMMENT_RE.replace_all(&no_headers, "").into_owned();

    // Strip innermost variations until none are left
    while VARIATION_RE.is_match(&text) {
        text = VARIATION_RE.replace_all(&text, "").into_owned();
    }

    MOVE_RE
        .find_iter(&text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Render headers and movetext.
///
/// `start_ply` is the absolute ply of the first move, so a history that
/// starts with Black to move is numbered `N...`. A non-standard start FEN
/// gets `SetUp`/`FEN` tags if the headers don't already carry them.
///
/// `result` is the game's termination token. When it is set, or the headers
/// carry a `Result` tag, the tag is rewritten to match and the movetext ends
/// with the same token (`*` while the game is undecided).
pub fn write_pgn(
    headers: &[(String, String)],
    start_fen: &str,
    start_ply: u32,
    sans: &[String],
    result: Option<&str>,
) -> String {
    let mut out = String::new();
    let mut tags: Vec<(String, String)> = headers
        .iter()
        .filter(|(key, _)| key != "SetUp" && key != "FEN")
        .cloned()
        .collect();

    let termination = match result {
        Some(token) => Some(token),
        None if tags.iter().any(|(key, _)| key == "Result") => Some("*"),
        None => None,
    };
    if let Some(token) = termination {
        match tags.iter_mut().find(|(key, _)| key == "Result") {
            Some(tag) => tag.1 = token.to_string(),
            None => tags.push(("Result".to_string(), token.to_string())),
        }
    }

    if start_fen != STANDARD_START_FEN {
        tags.push(("SetUp".to_string(), "1".to_string()));
        tags.push(("FEN".to_string(), start_fen.to_string()));
    }

    for (key, value) in &tags {
        out.push_str(&format!("[{key} \"{value}\"]\n"));
    }
    if !tags.is_empty() {
        out.push('\n');
    }

    let mut movetext = Vec::with_capacity(sans.len() + sans.len() / 2 + 1);
    for (i, san) in sans.iter().enumerate() {
        let ply = start_ply + i as u32;
        let move_number = ply / 2 + 1;
        if ply % 2 == 0 {
            movetext.push(format!("{move_number}. {san}"));
        } else if i == 0 {
            movetext.push(format!("{move_number}... {san}"));
        } else {
            movetext.push(san.clone());
        }
    }

    if let Some(token) = termination {
        movetext.push(token.to_string());
    }

    out.push_str(&movetext.join(" "));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pgn_basic() {
        let pgn = r#"[White "Player1"]
[Black "Player2"]
[Result "1-0"]

1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 1-0"#;

        let game = parse_pgn(pgn);
        assert_eq!(game.header("White"), Some("Player1"));
        assert_eq!(game.header("Result"), Some("1-0"));
        assert_eq!(game.moves, vec!["e4", "e5", "Nf3", "Nc6", "Bb5", "a6"]);
        assert_eq!(game.start_fen(), None);
    }

    #[test]
    fn test_parse_pgn_skips_comments_and_variations() {
        let pgn = "1. e4 {best by test} e5 (1... c5 2. Nf3 (2. c3 d5)) 2. Nf3 ; rest\n Nc6";
        let game = parse_pgn(pgn);
        assert_eq!(game.moves, vec!["e4", "e5", "Nf3", "Nc6"]);
    }

    #[test]
    fn test_parse_pgn_castling_and_promotion() {
        let game = parse_pgn("1. O-O-O+ Kb8 2. e8=Q# O-O");
        assert_eq!(game.moves, vec!["O-O-O+", "Kb8", "e8=Q#", "O-O"]);
    }

    #[test]
    fn test_write_pgn_black_to_move() {
        let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
        let sans = vec!["e5".to_string(), "Nf3".to_string()];
        let pgn = write_pgn(&[], fen, 1, &sans, None);
        assert!(pgn.contains("[SetUp \"1\"]"));
        assert!(pgn.contains(&format!("[FEN \"{fen}\"]")));
        assert!(pgn.ends_with("1... e5 2. Nf3"));
    }

    #[test]
    fn test_write_pgn_standard_start_has_no_tags() {
        let sans = vec!["e4".to_string(), "e5".to_string(), "Nf3".to_string()];
        assert_eq!(write_pgn(&[], STANDARD_START_FEN, 0, &sans, None), "1. e4 e5 2. Nf3");
    }

    #[test]
    fn test_write_pgn_rewrites_stale_result() {
        let headers = vec![
            ("White".to_string(), "A".to_string()),
            ("Result".to_string(), "1-0".to_string()),
        ];
        let sans = vec!["e4".to_string()];

        let undecided = write_pgn(&headers, STANDARD_START_FEN, 0, &sans, None);
        assert_eq!(undecided, "[White \"A\"]\n[Result \"*\"]\n\n1. e4 *");

        let decided = write_pgn(&headers, STANDARD_START_FEN, 0, &sans, Some("0-1"));
        assert!(decided.contains("[Result \"0-1\"]"));
        assert!(decided.ends_with("1. e4 0-1"));
    }

    #[test]
    fn test_write_pgn_result_without_headers() {
        let sans = vec!["f3".to_string(), "e5".to_string(), "g4".to_string(), "Qh4#".to_string()];
        let pgn = write_pgn(&[], STANDARD_START_FEN, 0, &sans, Some("0-1"));
        assert_eq!(pgn, "[Result \"0-1\"]\n\n1. f3 e5 2. g4 Qh4# 0-1");
    }
}
