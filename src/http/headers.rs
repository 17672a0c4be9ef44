//! Ordered multi-valued header storage

/// Ordered mapping from header name to the list of its values.
///
/// Names are compared ASCII case-insensitively (per
/// [RFC 7230](https://tools.ietf.org/html/rfc7230#section-3.2)); the spelling
/// of the first insertion is the one written back on the wire. Repeated
/// headers (`Cookie`, `Sec-WebSocket-Extensions`, ...) keep every value in
/// arrival order.
///
/// # Examples
///
/// ```
/// use tidewire::HeaderTable;
///
/// let mut headers = HeaderTable::new();
/// headers.append("Cookie", "a=1");
/// headers.append("cookie", "b=2");
///
/// assert_eq!(headers.get("COOKIE"), Some("a=1"));
/// assert_eq!(headers.get_all("Cookie"), ["a=1", "b=2"]);
/// assert_eq!(
///     headers.iter().collect::<Vec<_>>(),
///     [("Cookie", "a=1"), ("Cookie", "b=2")]
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderTable {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderTable {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value, keeping the ones already present under the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self.position(&name) {
            Some(i) => self.entries[i].1.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Same as [`append`](Self::append), but a `None` value adds nothing.
    #[inline]
    pub fn append_opt<V: Into<String>>(&mut self, name: impl Into<String>, value: Option<V>) {
        if let Some(value) = value {
            self.append(name, value);
        }
    }

    /// Replaces every value stored under `name` with a single one.
    ///
    /// The header keeps its original position when it already exists.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self.position(&name) {
            Some(i) => self.entries[i].1 = vec![value],
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Removes the header, returning its values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        let i = self.position(name)?;
        Some(self.entries.remove(i).1)
    }

    /// First value inserted under `name`.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    /// Every value inserted under `name`, oldest first.
    #[inline]
    pub fn get_all(&self, name: &str) -> &[String] {
        match self.position(name) {
            Some(i) => &self.entries[i].1,
            None => &[],
        }
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// `(name, value)` pairs in insertion order of the names, values of a
    /// repeated header flattened in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries.iter().flat_map(|(name, values)| {
            values.iter().map(move |value| (name.as_str(), value.as_str()))
        })
    }

    /// Number of `(name, value)` pairs.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, values)| values.len()).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_keeps_every_value() {
        let mut headers = HeaderTable::new();
        headers.append("Host", "localhost");
        headers.append("Cookie", "a=1");
        headers.append("Accept", "*/*");
        headers.append("Cookie", "b=2");

        assert_eq!(headers.len(), 4);
        assert_eq!(headers.get("Cookie"), Some("a=1"));
        assert_eq!(headers.get_all("Cookie"), ["a=1", "b=2"]);
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            [
                ("Host", "localhost"),
                ("Cookie", "a=1"),
                ("Cookie", "b=2"),
                ("Accept", "*/*"),
            ]
        );
    }

    #[test]
    fn lookup_ignores_case() {
        #[rustfmt::skip]
        let cases = [
            "content-length",
            "Content-Length",
            "CONTENT-LENGTH",
            "cOnTeNt-LeNgTh",
        ];

        let mut headers = HeaderTable::new();
        headers.append("Content-Length", "10");

        for name in cases {
            assert_eq!(headers.get(name), Some("10"), "{name}");
            assert!(headers.contains(name));
        }
        assert_eq!(headers.get("Content-Type"), None);
        assert!(headers.get_all("Content-Type").is_empty());
    }

    #[test]
    fn set_and_remove() {
        let mut headers = HeaderTable::new();
        headers.append("A", "1");
        headers.append("B", "2");
        headers.append("B", "3");
        headers.append("C", "4");

        headers.set("b", "5");
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            [("A", "1"), ("B", "5"), ("C", "4")]
        );

        assert_eq!(headers.remove("a"), Some(vec!["1".to_string()]));
        assert_eq!(headers.remove("a"), None);

        headers.set("D", "6");
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            [("B", "5"), ("C", "4"), ("D", "6")]
        );
    }

    #[test]
    fn append_opt_skips_none() {
        let mut headers = HeaderTable::new();
        headers.append_opt("Sec-WebSocket-Protocol", None::<String>);
        headers.append_opt("Upgrade", Some("websocket"));

        assert!(!headers.contains("Sec-WebSocket-Protocol"));
        assert_eq!(headers.get("upgrade"), Some("websocket"));
        assert_eq!(headers.len(), 1);
    }
}
