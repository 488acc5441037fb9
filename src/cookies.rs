use std::collections::BTreeMap;

/// Accumulated session cookies, a canonical name→value association.
///
/// A response updates only the cookies it sets (last write per name wins);
/// names it does not mention are retained. Backed by an ordered map so the
/// rendered `Cookie:` header never depends on insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    entries: BTreeMap<String, String>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    /// Merge the `Set-Cookie` headers of one response into this jar,
    /// returning the updated jar. Only the leading `name=value` pair of each
    /// header is taken; attributes after the first `;` (Path, HttpOnly, …)
    /// are ignored. Headers without a non-empty name and value are skipped.
    pub fn merged<'a, I>(&self, set_cookie_headers: I) -> CookieJar
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut jar = self.clone();
        for header in set_cookie_headers {
            if let Some((name, value)) = parse_set_cookie(header) {
                jar.entries.insert(name.to_owned(), value.to_owned());
            }
        }
        jar
    }

    /// Render the jar as a request `Cookie:` header value.
    pub fn header_value(&self) -> String {
        self.entries
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn parse_set_cookie(header: &str) -> Option<(&str, &str)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let (name, value) = (name.trim(), value.trim());
    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jar(pairs: &[(&str, &str)]) -> CookieJar {
        let mut jar = CookieJar::new();
        for (name, value) in pairs {
            jar.insert(*name, *value);
        }
        jar
    }

    #[test]
    fn response_overwrites_only_what_it_sets() {
        let prior = jar(&[("JSESSIONID", "s1"), ("lb", "node-3")]);
        let merged = prior.merged(["JSESSIONID=s2; Path=/; HttpOnly"]);

        assert_eq!(merged.get("JSESSIONID"), Some("s2"));
        assert_eq!(merged.get("lb"), Some("node-3"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn attributes_are_stripped() {
        let merged = CookieJar::new().merged(["sid=abc; Max-Age=3600; Secure; SameSite=Lax"]);
        assert_eq!(merged.get("sid"), Some("abc"));
        assert_eq!(merged.header_value(), "sid=abc");
    }

    #[test]
    fn empty_or_nameless_headers_are_skipped() {
        let prior = jar(&[("sid", "abc")]);
        let merged = prior.merged(["", "=oops", "sid=", "bare-token"]);
        assert_eq!(merged, prior);
    }

    #[test]
    fn merge_is_associative_over_response_sequence() {
        let base = jar(&[("a", "0")]);
        let r1 = ["a=1; Path=/", "b=1"];
        let r2 = ["b=2", "c=2"];

        let stepwise = base.merged(r1).merged(r2);
        let combined = base.merged(r1.into_iter().chain(r2));
        assert_eq!(stepwise, combined);
    }

    #[test]
    fn merge_is_idempotent_for_a_repeated_response() {
        let base = jar(&[("a", "0")]);
        let response = ["a=1", "b=1"];
        let once = base.merged(response);
        assert_eq!(once.merged(response), once);
    }

    #[test]
    fn header_value_is_order_insensitive() {
        let forward = jar(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let backward = jar(&[("c", "3"), ("b", "2"), ("a", "1")]);
        assert_eq!(forward.header_value(), backward.header_value());
        assert_eq!(forward.header_value(), "a=1; b=2; c=3");
    }

    #[test]
    fn empty_jar_renders_empty_header() {
        assert_eq!(CookieJar::new().header_value(), "");
    }
}
