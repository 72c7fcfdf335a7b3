//! Keyword index derivation.
//!
//! The raw string is the lowercased searchable fields joined with spaces. The
//! filtered index strips markup and punctuation, splits on whitespace, drops
//! English and Korean stopwords, and keeps the first occurrence of each token.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use toolharvest_shared::{CandidateRecord, CategoryScore, TOP_CATEGORY_COUNT};

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<[^>]*>").unwrap_or_else(|e| panic!("invalid tag pattern: {e}"))
});

static PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[.,;:]").unwrap_or_else(|e| panic!("invalid punctuation pattern: {e}"))
});

static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    ENGLISH_STOPWORDS
        .iter()
        .chain(KOREAN_STOPWORDS)
        .copied()
        .collect()
});

const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "aren't", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "can't", "cannot", "could", "couldn't", "did", "didn't", "do", "does",
    "doesn't", "doing", "don't", "down", "during", "each", "few", "for", "from", "further", "had",
    "hadn't", "has", "hasn't", "have", "haven't", "having", "he", "he'd", "he'll", "he's", "her",
    "here", "here's", "hers", "herself", "him", "himself", "his", "how", "how's", "i", "i'd",
    "i'll", "i'm", "i've", "if", "in", "into", "is", "isn't", "it", "it's", "its", "itself",
    "let's", "me", "more", "most", "mustn't", "my", "myself", "no", "nor", "not", "of", "off",
    "on", "once", "only", "or", "other", "ought", "our", "ours", "ourselves", "out", "over", "own",
    "same", "shan't", "she", "she'd", "she'll", "she's", "should", "shouldn't", "so", "some",
    "such", "than", "that", "that's", "the", "their", "theirs", "them", "themselves", "then",
    "there", "there's", "these", "they", "they'd", "they'll", "they're", "they've", "this",
    "those", "through", "to", "too", "under", "until", "up", "very", "was", "wasn't", "we", "we'd",
    "we'll", "we're", "we've", "were", "weren't", "what", "what's", "when", "when's", "where",
    "where's", "which", "while", "who", "who's", "whom", "why", "why's", "will", "with", "won't",
    "would", "wouldn't", "you", "you'd", "you'll", "you're", "you've", "your", "yours",
    "yourself", "yourselves",
];

const KOREAN_STOPWORDS: &[&str] = &[
    "아", "휴", "아이구", "아이쿠", "아이고", "어", "나", "우리", "저희", "따라", "의해", "을",
    "를", "에", "의", "가", "으로", "로", "에게", "뿐이다", "의거하여", "근거하여", "입각하여",
    "기준으로", "예하면", "예를", "들면", "들자면", "저", "소인", "소생", "지말고",
    "하지마", "하지마라", "다른", "물론", "또한", "그리고", "비길수", "없다", "해서는", "안된다",
    "뿐만", "아니라", "만이", "아니다", "만은", "막론하고", "관계없이", "그치지", "않다", "그러나",
    "그런데", "하지만", "든간에", "논하지", "따지지", "설사", "비록", "더라도", "아니면", "만", "못하다",
    "하는", "편이", "낫다", "불문하고", "향하여", "향해서", "향하다", "쪽으로", "틈타", "이용하여",
    "타다", "오르다", "제외하고", "이", "외에", "이밖에", "하여야", "비로소", "한다면", "몰라도",
    "외에도", "이곳", "여기", "부터", "기점으로", "따라서", "할", "생각이다", "하려고하다", "이리하여",
    "그리하여", "그렇게", "함으로써", "하지", "일때", "할때", "앞에서", "중에서", "보는데서",
    "으로써", "로써", "까지", "해야한다", "일것이다", "반드시", "할줄알다", "할수있다", "할수있어",
    "임에", "틀림없다", "등", "등등", "제", "겨우", "단지", "다만", "할뿐", "딩동",
    "댕그", "대해서", "대하여", "대하면", "훨씬", "얼마나", "얼마만큼", "얼마큼", "남짓", "여",
    "얼마간", "약간", "다소", "좀", "조금", "다수", "몇", "얼마", "지만", "하물며", "또", "그러니",
    "그러니까", "및", "그", "것", "수", "들", "더", "는", "은", "도", "와", "과", "한", "하다",
    "있다", "되다", "이다", "에서", "그것", "이것", "저것",
];

/// The raw and filtered keyword strings for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordIndex {
    pub raw: String,
    pub filtered: String,
}

/// Build the keyword strings from a candidate, its summary and its ranking.
pub fn build_keywords(
    candidate: &CandidateRecord,
    summary: &str,
    categories: &[CategoryScore],
) -> KeywordIndex {
    let top_categories = categories
        .iter()
        .take(TOP_CATEGORY_COUNT)
        .map(|s| s.category.label().to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    let raw = [
        candidate.name.as_str(),
        candidate.task.as_str(),
        candidate.task_slug.as_str(),
        summary,
        candidate.use_case.as_str(),
    ]
    .iter()
    .map(|field| field.trim().to_lowercase())
    .chain(std::iter::once(top_categories))
    .collect::<Vec<_>>()
    .join(" ");

    let filtered = filter_keywords(&raw);
    KeywordIndex { raw, filtered }
}

/// Normalize a keyword string into a deduplicated, stopword-free index.
///
/// Applying it to its own output changes nothing.
pub fn filter_keywords(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let untagged = HTML_TAG.replace_all(&lowered, "");
    let cleaned = PUNCTUATION.replace_all(&untagged, "");

    let mut seen = HashSet::new();
    cleaned
        .split_whitespace()
        .filter(|token| !STOPWORDS.contains(token))
        .filter(|token| seen.insert(*token))
        .collect::<Vec<_>>()
        .join(" ")
}
