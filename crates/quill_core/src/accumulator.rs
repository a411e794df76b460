/// Running text buffer for one unit. Applies no trimming or normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentAccumulator {
    buffer: String,
}

impl ContentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            buffer: content.into(),
        }
    }

    pub fn append(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// Cache hits and fresh attempts replace rather than append.
    pub fn replace(&mut self, text: impl Into<String>) {
        self.buffer = text.into();
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn snapshot(&self) -> &str {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::ContentAccumulator;

    #[test]
    fn append_keeps_whitespace_exactly() {
        let mut acc = ContentAccumulator::new();
        acc.append("  two  spaces  ");
        acc.append("\n");
        assert_eq!(acc.snapshot(), "  two  spaces  \n");
    }

    #[test]
    fn replace_discards_previous_text() {
        let mut acc = ContentAccumulator::with_content("partial");
        acc.replace("FULL TEXT");
        assert_eq!(acc.snapshot(), "FULL TEXT");
        acc.clear();
        assert!(acc.is_empty());
    }
}
