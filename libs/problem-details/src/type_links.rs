//! Status-Link Table: HTTP status code to the RFC section that defines it.
//!
//! The standard table covers the codes registered with IANA. It is used by the
//! error writer to fill in the default `type` member of a problem document when
//! the caller did not supply one.

use std::collections::BTreeMap;

/// Standard links, sorted by status code.
const STANDARD_LINKS: &[(u16, &str)] = &[
    (100, "https://tools.ietf.org/html/rfc7231#section-6.2.1"),
    (101, "https://tools.ietf.org/html/rfc7231#section-6.2.2"),
    (200, "https://tools.ietf.org/html/rfc7231#section-6.3.1"),
    (201, "https://tools.ietf.org/html/rfc7231#section-6.3.2"),
    (202, "https://tools.ietf.org/html/rfc7231#section-6.3.3"),
    (203, "https://tools.ietf.org/html/rfc7231#section-6.3.4"),
    (204, "https://tools.ietf.org/html/rfc7231#section-6.3.5"),
    (205, "https://tools.ietf.org/html/rfc7231#section-6.3.6"),
    (206, "https://tools.ietf.org/html/rfc7233#section-4.1"),
    (207, "https://tools.ietf.org/html/rfc4918"),
    (208, "https://tools.ietf.org/html/rfc5842"),
    (226, "https://tools.ietf.org/html/rfc3229"),
    (300, "https://tools.ietf.org/html/rfc7231#section-6.4.1"),
    (301, "https://tools.ietf.org/html/rfc7231#section-6.4.2"),
    (302, "https://tools.ietf.org/html/rfc7231#section-6.4.3"),
    (303, "https://tools.ietf.org/html/rfc7231#section-6.4.4"),
    (305, "https://tools.ietf.org/html/rfc7231#section-6.4.5"),
    (306, "https://tools.ietf.org/html/rfc7231#section-6.4.6"),
    (307, "https://tools.ietf.org/html/rfc7231#section-6.4.7"),
    (308, "https://tools.ietf.org/html/rfc7538"),
    (400, "https://tools.ietf.org/html/rfc7231#section-6.5.1"),
    (401, "https://tools.ietf.org/html/rfc7235#section-3.1"),
    (402, "https://tools.ietf.org/html/rfc7231#section-6.5.2"),
    (403, "https://tools.ietf.org/html/rfc7231#section-6.5.3"),
    (404, "https://tools.ietf.org/html/rfc7231#section-6.5.4"),
    (405, "https://tools.ietf.org/html/rfc7231#section-6.5.5"),
    (406, "https://tools.ietf.org/html/rfc7231#section-6.5.6"),
    (407, "https://tools.ietf.org/html/rfc7235#section-3.2"),
    (408, "https://tools.ietf.org/html/rfc7231#section-6.5.7"),
    (409, "https://tools.ietf.org/html/rfc7231#section-6.5.8"),
    (410, "https://tools.ietf.org/html/rfc7231#section-6.5.9"),
    (411, "https://tools.ietf.org/html/rfc7231#section-6.5.10"),
    (412, "https://tools.ietf.org/html/rfc7232#section-4.2"),
    (413, "https://tools.ietf.org/html/rfc7231#section-6.5.11"),
    (414, "https://tools.ietf.org/html/rfc7231#section-6.5.12"),
    (415, "https://tools.ietf.org/html/rfc7231#section-6.5.13"),
    (416, "https://tools.ietf.org/html/rfc7233#section-4.4"),
    (417, "https://tools.ietf.org/html/rfc7231#section-6.5.14"),
    (421, "https://tools.ietf.org/html/rfc7540#section-9.1.2"),
    (422, "https://tools.ietf.org/html/rfc4918"),
    (423, "https://tools.ietf.org/html/rfc4918"),
    (424, "https://tools.ietf.org/html/rfc4918"),
    (425, "https://tools.ietf.org/html/rfc8470"),
    (426, "https://tools.ietf.org/html/rfc7231#section-6.5.15"),
    (428, "https://tools.ietf.org/html/rfc6585"),
    (429, "https://tools.ietf.org/html/rfc6585"),
    (431, "https://tools.ietf.org/html/rfc6585"),
    (451, "https://tools.ietf.org/html/rfc7725"),
    (500, "https://tools.ietf.org/html/rfc7231#section-6.6.1"),
    (501, "https://tools.ietf.org/html/rfc7231#section-6.6.2"),
    (502, "https://tools.ietf.org/html/rfc7231#section-6.6.3"),
    (503, "https://tools.ietf.org/html/rfc7231#section-6.6.4"),
    (504, "https://tools.ietf.org/html/rfc7231#section-6.6.5"),
    (505, "https://tools.ietf.org/html/rfc7231#section-6.6.6"),
    (506, "https://tools.ietf.org/html/rfc2295"),
    (507, "https://tools.ietf.org/html/rfc4918"),
    (508, "https://tools.ietf.org/html/rfc5842"),
    (510, "https://tools.ietf.org/html/rfc2774"),
    (511, "https://tools.ietf.org/html/rfc6585"),
];

/// Look up the standard link for `status` without building a table.
#[must_use]
pub fn standard_link(status: u16) -> Option<&'static str> {
    STANDARD_LINKS
        .binary_search_by_key(&status, |(code, _)| *code)
        .ok()
        .map(|idx| STANDARD_LINKS[idx].1)
}

/// Mapping of HTTP status code to the default problem `type` link.
///
/// Built once when the error writer is constructed and never mutated while
/// requests are being served. Callers that want different canonical links
/// either extend [`TypeLinks::standard`] or start from [`TypeLinks::empty`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeLinks {
    links: BTreeMap<u16, String>,
}

impl TypeLinks {
    /// The IANA-registered codes mapped to their defining RFC sections.
    #[must_use]
    pub fn standard() -> Self {
        let links = STANDARD_LINKS
            .iter()
            .map(|(code, url)| (*code, (*url).to_owned()))
            .collect();
        Self { links }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            links: BTreeMap::new(),
        }
    }

    /// Default `type` link for `status`, if one is known.
    #[must_use]
    pub fn get(&self, status: u16) -> Option<&str> {
        self.links.get(&status).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, status: u16) -> bool {
        self.links.contains_key(&status)
    }

    /// Add or replace a single link.
    #[must_use]
    pub fn with_link(mut self, status: u16, url: impl Into<String>) -> Self {
        self.links.insert(status, url.into());
        self
    }

    /// Drop the link for `status`, so documents for that code carry no default `type`.
    #[must_use]
    pub fn without(mut self, status: u16) -> Self {
        self.links.remove(&status);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &str)> {
        self.links.iter().map(|(code, url)| (*code, url.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl Default for TypeLinks {
    fn default() -> Self {
        Self::standard()
    }
}

impl<S: Into<String>> Extend<(u16, S)> for TypeLinks {
    fn extend<I: IntoIterator<Item = (u16, S)>>(&mut self, iter: I) {
        self.links
            .extend(iter.into_iter().map(|(code, url)| (code, url.into())));
    }
}

impl<S: Into<String>> FromIterator<(u16, S)> for TypeLinks {
    fn from_iter<I: IntoIterator<Item = (u16, S)>>(iter: I) -> Self {
        let mut links = Self::empty();
        links.extend(iter);
        links
    }
}
