use std::collections::HashMap;

/// Parameters allowed to keep every repeated value.
pub const ARRAY_PARAMS: &[&str] = &["sort", "filter", "limit", "offset"];

fn key_of(pair: &str) -> &str {
    pair.split_once('=').map(|(k, _)| k).unwrap_or(pair)
}

/// Collapses repeated query parameters to their last occurrence, except for
/// keys in `whitelist`. Returns `None` when nothing had to change.
///
/// Keys are compared as they appear on the wire; pairs are kept in their
/// original order.
pub fn collapse_repeated_params(query: &str, whitelist: &[&str]) -> Option<String> {
    let pairs: Vec<&str> = query.split('&').filter(|pair| !pair.is_empty()).collect();

    let mut last_index: HashMap<&str, usize> = HashMap::with_capacity(pairs.len());
    for (idx, pair) in pairs.iter().enumerate() {
        last_index.insert(key_of(pair), idx);
    }

    let keep: Vec<bool> = pairs
        .iter()
        .enumerate()
        .map(|(idx, pair)| {
            let key = key_of(pair);
            whitelist.contains(&key) || last_index.get(key) == Some(&idx)
        })
        .collect();

    if keep.iter().all(|k| *k) {
        return None;
    }

    let collapsed: Vec<&str> = pairs
        .iter()
        .zip(keep)
        .filter(|(_, keep)| *keep)
        .map(|(pair, _)| *pair)
        .collect();
    Some(collapsed.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untouched_when_no_repeats() {
        assert_eq!(collapse_repeated_params("a=1&b=2", ARRAY_PARAMS), None);
        assert_eq!(collapse_repeated_params("", ARRAY_PARAMS), None);
    }

    #[test]
    fn test_keeps_last_value() {
        assert_eq!(
            collapse_repeated_params("type=a&page=1&type=b", ARRAY_PARAMS),
            Some("page=1&type=b".to_string())
        );
    }

    #[test]
    fn test_whitelisted_keys_stay_arrays() {
        assert_eq!(
            collapse_repeated_params("sort=a&sort=b&q=x&q=y", ARRAY_PARAMS),
            Some("sort=a&sort=b&q=y".to_string())
        );
        assert_eq!(collapse_repeated_params("limit=1&limit=2", ARRAY_PARAMS), None);
    }

    #[test]
    fn test_long_query_collapses_in_linear_time() {
        let mut query: Vec<String> = (0..20_000).map(|i| format!("k{}=v", i)).collect();
        query.push("k0=last".to_string());
        let query = query.join("&");

        let started = std::time::Instant::now();
        let collapsed = collapse_repeated_params(&query, ARRAY_PARAMS).unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        assert!(collapsed.starts_with("k1=v&"));
        assert!(collapsed.ends_with("&k0=last"));
        assert_eq!(collapsed.split('&').count(), 20_000);
    }

    #[test]
    fn test_bare_keys_count_as_repeats() {
        assert_eq!(
            collapse_repeated_params("flag&flag=1", ARRAY_PARAMS),
            Some("flag=1".to_string())
        );
    }
}
