use thiserror::Error;

pub const WORD_PARAMETER: &str = "word";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("request has no query string")]
    MissingQuery,

    #[error("query has no 'word' parameter")]
    MissingWord,

    #[error("'word' parameter is empty")]
    EmptyWord,
}

/// Extracts the search word from a `word=<W>` query string.
///
/// Percent-encoding and `+` are decoded. An empty word is rejected because
/// every position would match it.
pub fn parse_search_query(query: Option<&str>) -> Result<String, QueryError> {
    let query = query.filter(|q| !q.is_empty()).ok_or(QueryError::MissingQuery)?;
    let (_, word) = url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == WORD_PARAMETER)
        .ok_or(QueryError::MissingWord)?;
    if word.is_empty() {
        return Err(QueryError::EmptyWord);
    }
    Ok(word.into_owned())
}

/// Counts every position of `text` where `word` starts, overlapping matches
/// included: after a hit the scan resumes one character later, so `"aa"`
/// occurs twice in `"aaa"`. Matching is case-sensitive.
pub fn count_occurrences(text: &str, word: &str) -> u64 {
    if word.is_empty() {
        return 0;
    }

    let mut count = 0;
    let mut index = 0;
    while let Some(offset) = text[index..].find(word) {
        let hit = index + offset;
        count += 1;
        // Step over one whole character to stay on a char boundary.
        let step = text[hit..].chars().next().map_or(1, char::len_utf8);
        index = hit + step;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_matches_count() {
        assert_eq!(count_occurrences("aaa", "aa"), 2);
        assert_eq!(count_occurrences("aaaa", "aa"), 3);
        assert_eq!(count_occurrences("abababa", "aba"), 3);
    }

    #[test]
    fn test_missing_word_counts_zero() {
        assert_eq!(count_occurrences("aaa", "xyz"), 0);
        assert_eq!(count_occurrences("", "a"), 0);
        assert_eq!(count_occurrences("short", "much longer"), 0);
    }

    #[test]
    fn test_case_sensitive() {
        let text = "War and Peace. war and peace.";
        assert_eq!(count_occurrences(text, "war"), 1);
        assert_eq!(count_occurrences(text, "War"), 1);
        assert_eq!(count_occurrences(text, "and"), 2);
    }

    #[test]
    fn test_multibyte_text() {
        assert_eq!(count_occurrences("ééé", "éé"), 2);
        assert_eq!(count_occurrences("스레드 스레드", "스레드"), 2);
        assert_eq!(count_occurrences("naïve", "ve"), 1);
    }

    #[test]
    fn test_empty_word_counts_nothing() {
        assert_eq!(count_occurrences("abc", ""), 0);
    }

    #[test]
    fn test_parse_valid_query() {
        assert_eq!(parse_search_query(Some("word=peace")), Ok("peace".to_string()));
        assert_eq!(parse_search_query(Some("word=Prince%20Andrew")), Ok("Prince Andrew".to_string()));
        assert_eq!(parse_search_query(Some("word=a+b")), Ok("a b".to_string()));
        assert_eq!(parse_search_query(Some("lang=en&word=war")), Ok("war".to_string()));
    }

    #[test]
    fn test_parse_rejects_malformed_query() {
        assert_eq!(parse_search_query(None), Err(QueryError::MissingQuery));
        assert_eq!(parse_search_query(Some("")), Err(QueryError::MissingQuery));
        assert_eq!(parse_search_query(Some("wrd=peace")), Err(QueryError::MissingWord));
        assert_eq!(parse_search_query(Some("peace")), Err(QueryError::MissingWord));
        assert_eq!(parse_search_query(Some("word=")), Err(QueryError::EmptyWord));
    }
}
