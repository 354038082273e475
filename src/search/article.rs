//! Exact-article reference parsing.
//!
//! Detects queries of the form `<법령명> 제N조(의M)` so they can take
//! the direct-lookup fast path instead of semantic search.

use std::sync::LazyLock;

use regex::Regex;

use crate::catalog::normalize_law_title;

/// Maximum tokens a law title may span.
const MAX_TITLE_TOKENS: usize = 6;

/// Suffix tokens that cannot stand alone as a law title and pull in
/// the preceding word (`공공주택 특별법`, `주택임대차보호법 시행령`).
const TITLE_TAILS: [&str; 8] = [
    "법",
    "법률",
    "특별법",
    "시행령",
    "시행규칙",
    "규칙",
    "조치법",
    "령",
];

/// Connective tokens inside compound titles
/// (`부동산 거래신고 등에 관한 법률`).
const CONNECTIVES: [&str; 5] = ["등에", "관한", "대한", "위한", "및"];

/// Trailing particles that mark a sentence word rather than part of a
/// law name.
const PARTICLES: [char; 11] = ['은', '는', '이', '가', '을', '를', '의', '에', '서', '도', '만'];

static ARTICLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(
        r"(?x)
        (?P<title>[가-힣A-Za-z0-9·()]+(?:\s+[가-힣A-Za-z0-9·()]+)*?)
        \s*
        제\s*(?P<num>\d+)\s*조
        (?:\s*의\s*(?P<sub>\d+))?
        ",
    )
    .unwrap()
});

/// A resolved article reference extracted from a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRef {
    /// Normalized law title.
    pub law_title: String,
    /// Canonical article number: `제7조` or `제7조의2`.
    pub article_number: String,
}

/// Extracts an article reference from a query, when present.
///
/// The title is the token run immediately preceding `제N조`. A token
/// that already reads as a complete law name (`주택임대차보호법`)
/// stands alone; tail tokens (`시행령`, `특별법`) and connectives
/// (`관한`, `등에`) pull in preceding words up to a cap.
#[must_use]
pub fn parse_article_ref(query: &str) -> Option<ArticleRef> {
    let caps = ARTICLE_RE.captures(query)?;
    let raw_title = caps.name("title")?.as_str();
    let num = caps.name("num")?.as_str();
    let sub = caps.name("sub").map(|m| m.as_str());

    let title = extract_title(raw_title)?;
    let article_number = sub.map_or_else(
        || format!("제{num}조"),
        |s| format!("제{num}조의{s}"),
    );

    Some(ArticleRef {
        law_title: title,
        article_number,
    })
}

/// A token that ends like a law name and is not a bare suffix.
fn is_complete_title(token: &str) -> bool {
    let stripped = normalize_law_title(token);
    if TITLE_TAILS.contains(&stripped.as_str()) {
        return false;
    }
    ["법", "령", "규칙", "률"]
        .iter()
        .any(|suffix| stripped.ends_with(suffix))
}

fn ends_with_particle(token: &str) -> bool {
    token
        .chars()
        .last()
        .is_some_and(|c| PARTICLES.contains(&c))
}

/// Walks the candidate token run right-to-left, accumulating the law
/// title.
fn extract_title(raw: &str) -> Option<String> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let mut kept: Vec<&str> = Vec::new();

    for token in tokens.iter().rev() {
        if kept.len() >= MAX_TITLE_TOKENS {
            break;
        }
        if kept.is_empty() {
            kept.push(token);
            if is_complete_title(token) {
                break;
            }
            continue;
        }
        if CONNECTIVES.contains(token) {
            kept.push(token);
            continue;
        }
        if ends_with_particle(token) {
            break;
        }
        kept.push(token);
        if is_complete_title(token) {
            break;
        }
    }

    kept.reverse();
    let joined = kept.join(" ");
    let normalized = normalize_law_title(&joined);
    (!normalized.is_empty()).then_some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("주택임대차보호법 제7조", "주택임대차보호법", "제7조")]
    #[test_case("주택임대차보호법 제6조의3", "주택임대차보호법", "제6조의3")]
    #[test_case("주택임대차보호법 제 7 조", "주택임대차보호법", "제7조")]
    #[test_case("공인중개사법 제33조 알려줘", "공인중개사법", "제33조")]
    #[test_case("민법 제618조", "민법", "제618조")]
    fn test_parse_basic(query: &str, law: &str, article: &str) {
        let parsed = parse_article_ref(query).unwrap_or_else(|| unreachable!());
        assert_eq!(parsed.law_title, law);
        assert_eq!(parsed.article_number, article);
    }

    #[test]
    fn test_parse_multiword_title() {
        let parsed = parse_article_ref("부동산 거래신고 등에 관한 법률 제3조")
            .unwrap_or_else(|| unreachable!());
        assert_eq!(parsed.article_number, "제3조");
        assert_eq!(parsed.law_title, "부동산거래신고등에관한법률");
    }

    #[test]
    fn test_parse_tail_pulls_preceding_word() {
        let parsed = parse_article_ref("주택임대차보호법 시행령 제2조")
            .unwrap_or_else(|| unreachable!());
        assert_eq!(parsed.law_title, "주택임대차보호법시행령");
    }

    #[test]
    fn test_parse_strips_sentence_prefix() {
        let parsed = parse_article_ref("그러면 주택임대차보호법 제7조 내용은?")
            .unwrap_or_else(|| unreachable!());
        assert_eq!(parsed.law_title, "주택임대차보호법");
    }

    #[test]
    fn test_parse_decorated_title() {
        let parsed = parse_article_ref("주택임대차보호법(법률) 제7조")
            .unwrap_or_else(|| unreachable!());
        assert_eq!(parsed.law_title, "주택임대차보호법");
    }

    #[test_case("전세금 인상 한도는 얼마야?")]
    #[test_case("강남구 아파트 시세 분석해줘")]
    #[test_case("안녕하세요")]
    fn test_no_article_reference(query: &str) {
        assert!(parse_article_ref(query).is_none());
    }
}
