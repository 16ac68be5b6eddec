use std::collections::BTreeMap;

use wxgate_common::{Error, Result};

/// Sorted, lower-cased `k1=v1&k2=v2` concatenation used as signing input.
///
/// Keys are sorted by their original spelling, then lower-cased. Two keys that
/// become equal after lower-casing are rejected with [`Error::KeyCollision`]
/// rather than one silently shadowing the other.
pub fn canonical_string<K, V, I>(args: I) -> Result<String>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut sorted: BTreeMap<String, String> = BTreeMap::new();
    for (k, v) in args {
        let key = k.as_ref().to_string();
        if sorted.insert(key.clone(), v.as_ref().to_string()).is_some() {
            return Err(Error::KeyCollision(key));
        }
    }

    let mut seen = std::collections::HashSet::with_capacity(sorted.len());
    let mut out = String::new();
    for (key, value) in &sorted {
        let lower = key.to_lowercase();
        if !seen.insert(lower.clone()) {
            return Err(Error::KeyCollision(lower));
        }
        out.push('&');
        out.push_str(&lower);
        out.push('=');
        out.push_str(value);
    }

    Ok(out.strip_prefix('&').unwrap_or(&out).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_and_lowercases() {
        let s = canonical_string([
            ("url", "http://example.com"),
            ("nonceStr", "abc"),
            ("timestamp", "1414587457"),
            ("jsapi_ticket", "T"),
        ])
        .unwrap();
        assert_eq!(
            s,
            "jsapi_ticket=T&noncestr=abc&timestamp=1414587457&url=http://example.com"
        );
    }

    #[test]
    fn deterministic() {
        let args = vec![("b", "2"), ("a", "1"), ("C", "3")];
        let first = canonical_string(args.clone()).unwrap();
        let second = canonical_string(args).unwrap();
        assert_eq!(first, second);
        // Uppercase sorts before lowercase in byte order.
        assert_eq!(first, "c=3&a=1&b=2");
    }

    #[test]
    fn empty_map_is_empty_string() {
        assert_eq!(canonical_string(Vec::<(&str, &str)>::new()).unwrap(), "");
    }

    #[test]
    fn case_collision_rejected() {
        let err = canonical_string([("nonceStr", "a"), ("noncestr", "b")]).unwrap_err();
        assert_eq!(err, Error::KeyCollision("noncestr".into()));
    }

    #[test]
    fn duplicate_key_rejected() {
        assert!(canonical_string([("a", "1"), ("a", "2")]).is_err());
    }

    #[test]
    fn values_keep_their_case() {
        assert_eq!(canonical_string([("Key", "VaLuE")]).unwrap(), "key=VaLuE");
    }
}
