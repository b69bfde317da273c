use crate::{Pep508Error, Pep508ErrorSource};

/// A reader over a dependency specifier or marker expression.
///
/// Positions are byte offsets into the whole input, so errors built through the cursor can
/// underline the offending span of the original text.
#[derive(Debug, Clone)]
pub(crate) struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    /// The unread part of the input.
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// The number of unread bytes.
    pub(crate) fn remaining(&self) -> usize {
        self.rest().len()
    }

    /// The input between two byte offsets.
    pub(crate) fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.input[start..end]
    }

    pub(crate) fn peek(&self) -> Option<(usize, char)> {
        self.peek_char().map(|char| (self.pos, char))
    }

    pub(crate) fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub(crate) fn next(&mut self) -> Option<(usize, char)> {
        let char = self.peek_char()?;
        let pos = self.pos;
        self.pos += char.len_utf8();
        Some((pos, char))
    }

    /// Consume `token` if it's next, returning its position.
    pub(crate) fn eat_char(&mut self, token: char) -> Option<usize> {
        if self.peek_char() == Some(token) {
            self.next().map(|(pos, _)| pos)
        } else {
            None
        }
    }

    pub(crate) fn eat_whitespace(&mut self) {
        self.take_str(char::is_whitespace);
    }

    /// The run of characters matching `condition` at the cursor, with its start position.
    pub(crate) fn peek_str(&self, condition: impl Fn(char) -> bool) -> (usize, &'a str) {
        let rest = self.rest();
        let len = rest.find(|char: char| !condition(char)).unwrap_or(rest.len());
        (self.pos, &rest[..len])
    }

    /// Consume the run of characters matching `condition`, returning its start position.
    pub(crate) fn take_str(&mut self, condition: impl Fn(char) -> bool) -> (usize, &'a str) {
        let (start, run) = self.peek_str(condition);
        self.pos += run.len();
        (start, run)
    }

    /// An error underlining `len` bytes from `start`.
    pub(crate) fn error(
        &self,
        message: impl Into<String>,
        start: usize,
        len: usize,
    ) -> Pep508Error {
        Pep508Error {
            message: Pep508ErrorSource::String(message.into()),
            start,
            len,
            input: self.input.to_string(),
        }
    }

    /// An error underlining the single character `char` found at `pos`.
    pub(crate) fn unexpected(
        &self,
        message: impl Into<String>,
        pos: usize,
        char: char,
    ) -> Pep508Error {
        self.error(message, pos, char.len_utf8())
    }

    /// An error for a form that is valid PEP 508 but can't be locked, underlining everything
    /// from `start` on.
    pub(crate) fn unsupported(&self, message: impl Into<String>, start: usize) -> Pep508Error {
        Pep508Error {
            message: Pep508ErrorSource::UnsupportedRequirement(message.into()),
            start,
            len: self.input.len() - start,
            input: self.input.to_string(),
        }
    }

    /// Consume `expected`, or fail on whatever is there instead.
    ///
    /// At the end of the input, the error points at `span_start`, the token that opened the
    /// construct still waiting for `expected`.
    pub(crate) fn next_expect_char(
        &mut self,
        expected: char,
        span_start: usize,
    ) -> Result<(), Pep508Error> {
        match self.next() {
            Some((_, found)) if found == expected => Ok(()),
            Some((pos, found)) => Err(self.unexpected(
                format!("Expected '{expected}', found '{found}'"),
                pos,
                found,
            )),
            None => Err(self.error(
                format!("Expected '{expected}', found end of dependency specification"),
                span_start,
                1,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Cursor;

    #[test]
    fn runs_are_byte_offsets() {
        let mut cursor = Cursor::new("pkg-é ; os_name");
        assert_eq!(cursor.take_str(|char| !char.is_whitespace()), (0, "pkg-é"));
        assert_eq!(cursor.pos(), "pkg-é".len());
        cursor.eat_whitespace();
        assert_eq!(cursor.eat_char(';'), Some(7));
        cursor.eat_whitespace();
        assert_eq!(cursor.peek_str(char::is_alphanumeric), (9, "os"));
        assert_eq!(cursor.remaining(), "os_name".len());
        assert_eq!(cursor.slice(9, 16), "os_name");
    }

    #[test]
    fn expect_char() {
        let mut cursor = Cursor::new("'win32");
        let (start, _) = cursor.next().unwrap();
        cursor.take_str(|char| char != '\'');
        let err = cursor.next_expect_char('\'', start).unwrap_err();
        assert_eq!(err.start, 0);
        assert_eq!(
            err.to_string(),
            "Expected ''', found end of dependency specification\n'win32\n^"
        );

        let mut cursor = Cursor::new("ab");
        cursor.next_expect_char('a', 0).unwrap();
        let err = cursor.next_expect_char('c', 0).unwrap_err();
        assert_eq!((err.start, err.len), (1, 1));
        assert!(err.to_string().starts_with("Expected 'c', found 'b'"));
    }
}
