//! Parser for the ranked-category answer format.
//!
//! The accepted language is exactly five comma-separated entries:
//!
//! ```text
//! 1:Images:90, 2: Data Analysis:80, 3:NLP: 70, 4:Gaming:40, 5:Health:5
//! ```
//!
//! The first rank is the literal `1`, later ranks are any single digit. A
//! name is one or more ASCII letters or spaces. A score is one to three
//! digits, optionally preceded by one space. Entries are separated by `", "`
//! and nothing may follow the fifth entry.

use thiserror::Error;

/// Entries the grammar requires.
pub const ENTRY_COUNT: usize = 5;

/// One parsed `rank:name:score` entry. The name is trimmed but not yet
/// checked against the ontology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedEntry {
    pub rank: u8,
    pub name: String,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("empty answer")]
    Empty,
    #[error("entry {entry}: expected rank {expected} at byte {at}")]
    BadRank {
        entry: usize,
        expected: &'static str,
        at: usize,
    },
    #[error("entry {entry}: expected ':' at byte {at}")]
    MissingColon { entry: usize, at: usize },
    #[error("entry {entry}: expected a category name at byte {at}")]
    MissingName { entry: usize, at: usize },
    #[error("entry {entry}: expected a 1-3 digit score at byte {at}")]
    BadScore { entry: usize, at: usize },
    #[error("entry {entry}: expected \", \" at byte {at}")]
    MissingSeparator { entry: usize, at: usize },
    #[error("unexpected trailing input at byte {at}")]
    TrailingInput { at: usize },
}

struct Cursor<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, max: usize, pred: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.pos;
        while self.pos - start < max && self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }
}

/// Parse an answer into exactly [`ENTRY_COUNT`] entries.
pub fn parse_ranking(text: &str) -> Result<Vec<RankedEntry>, GrammarError> {
    if text.is_empty() {
        return Err(GrammarError::Empty);
    }
    let mut cur = Cursor {
        src: text.as_bytes(),
        pos: 0,
    };
    let mut entries = Vec::with_capacity(ENTRY_COUNT);

    for entry in 1..=ENTRY_COUNT {
        if entry > 1 && !(cur.eat(b',') && cur.eat(b' ')) {
            return Err(GrammarError::MissingSeparator { entry, at: cur.pos });
        }

        let at = cur.pos;
        let rank = match cur.peek() {
            Some(b'1') if entry == 1 => b'1',
            Some(d) if entry > 1 && d.is_ascii_digit() => d,
            _ => {
                return Err(GrammarError::BadRank {
                    entry,
                    expected: if entry == 1 { "1" } else { "digit" },
                    at,
                });
            }
        };
        cur.pos += 1;

        if !cur.eat(b':') {
            return Err(GrammarError::MissingColon { entry, at: cur.pos });
        }

        let name_at = cur.pos;
        let name = cur.take_while(usize::MAX, |b| b.is_ascii_alphabetic() || b == b' ');
        if name.is_empty() {
            return Err(GrammarError::MissingName { entry, at: name_at });
        }

        if !cur.eat(b':') {
            return Err(GrammarError::MissingColon { entry, at: cur.pos });
        }
        cur.eat(b' ');

        let score_at = cur.pos;
        let digits = cur.take_while(3, |b| b.is_ascii_digit());
        if digits.is_empty() {
            return Err(GrammarError::BadScore {
                entry,
                at: score_at,
            });
        }

        // Both slices are ASCII by construction.
        let name = String::from_utf8_lossy(name).trim().to_string();
        let score = digits
            .iter()
            .fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0'));

        entries.push(RankedEntry {
            rank: rank - b'0',
            name,
            score,
        });
    }

    if cur.pos != text.len() {
        return Err(GrammarError::TrailingInput { at: cur.pos });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(entries: &[RankedEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn parses_canonical_answer() {
        let entries =
            parse_ranking("1:Images:90, 2:Data Analysis:80, 3:NLP:70, 4:Gaming:40, 5:Health:5")
                .unwrap();
        assert_eq!(
            names(&entries),
            ["Images", "Data Analysis", "NLP", "Gaming", "Health"]
        );
        assert_eq!(
            entries.iter().map(|e| e.score).collect::<Vec<_>>(),
            [90, 80, 70, 40, 5]
        );
        assert_eq!(entries[4].rank, 5);
    }

    #[test]
    fn accepts_optional_spaces_after_colons() {
        let entries =
            parse_ranking("1: Images: 90, 2: NLP:80, 3:CRM: 70, 4: Gaming: 40, 5:Health:100")
                .unwrap();
        assert_eq!(names(&entries), ["Images", "NLP", "CRM", "Gaming", "Health"]);
        assert_eq!(entries[0].score, 90);
    }

    #[test]
    fn later_ranks_need_not_be_sequential() {
        let entries =
            parse_ranking("1:Images:90, 1:NLP:80, 9:CRM:70, 4:Gaming:40, 0:Health:10").unwrap();
        assert_eq!(entries[2].rank, 9);
    }

    #[test]
    fn rejects_malformed_answers() {
        let bad = [
            "",
            "Images:90, NLP:80, CRM:70, Gaming:40, Health:10",
            "2:Images:90, 2:NLP:80, 3:CRM:70, 4:Gaming:40, 5:Health:10",
            "1:Images:90, 2:NLP:80, 3:CRM:70, 4:Gaming:40",
            "1:Images:90, 2:NLP:80, 3:CRM:70, 4:Gaming:40, 5:Health:10, 6:Videos:5",
            "1:Images:90,2:NLP:80, 3:CRM:70, 4:Gaming:40, 5:Health:10",
            "1:Images:1000, 2:NLP:80, 3:CRM:70, 4:Gaming:40, 5:Health:10",
            "1:Images:90, 2:NLP:80, 3:CRM:70, 4:Gaming:40, 5:Health:10.",
            "1:Images:90, 2:NLP:80, 3:CRM:70, 4:Gaming:40, 5:Health:",
            "1::90, 2:NLP:80, 3:CRM:70, 4:Gaming:40, 5:Health:10",
            "1:Data-Analysis:90, 2:NLP:80, 3:CRM:70, 4:Gaming:40, 5:Health:10",
            "1:Images:90, 2:NLP:80, 3:CRM:70, 4:Gaming:40, 5:Health:10\n",
            "1:{Images:90}, 2:{NLP:80}, 3:{CRM:70}, 4:{Gaming:40}, 5:{Health:10}",
        ];
        for text in bad {
            assert!(parse_ranking(text).is_err(), "accepted {text:?}");
        }
    }

    #[test]
    fn errors_point_at_the_failure() {
        assert_eq!(
            parse_ranking("1:Images:90; 2:NLP:80"),
            Err(GrammarError::MissingSeparator { entry: 2, at: 11 })
        );
        assert_eq!(
            parse_ranking("1:Images:90, 2:NLP:80, 3:CRM:70, 4:Gaming:40, 5:Health:1000"),
            Err(GrammarError::TrailingInput { at: 58 })
        );
    }
}
