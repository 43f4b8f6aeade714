//! The profile string table, kept as byte ranges into the decoded buffer.

use std::borrow::Cow;
use std::ops::Range;

#[derive(Debug, Default)]
pub struct StringTable {
    spans: Vec<Range<usize>>,
}

impl StringTable {
    pub fn clear(&mut self) {
        self.spans.clear();
    }

    pub fn push(&mut self, span: Range<usize>) {
        self.spans.push(span);
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Raw bytes of entry `index`, if it exists.
    pub fn get<'a>(&self, buf: &'a [u8], index: i64) -> Option<&'a [u8]> {
        let span = self.spans.get(usize::try_from(index).ok()?)?;
        buf.get(span.clone())
    }

    /// Entry `index` as text. Missing entries resolve to the empty string.
    pub fn resolve<'a>(&self, buf: &'a [u8], index: i64) -> Cow<'a, str> {
        self.get(buf, index)
            .map_or(Cow::Borrowed(""), String::from_utf8_lossy)
    }

    /// Index of the first entry equal to `needle`.
    pub fn position(&self, buf: &[u8], needle: &str) -> Option<i64> {
        self.spans
            .iter()
            .position(|span| buf.get(span.clone()) == Some(needle.as_bytes()))
            .and_then(|i| i64::try_from(i).ok())
    }
}
