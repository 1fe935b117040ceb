//! Lexical analysis of an input line into words.

/// Which quote characters group text into a single word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quoting {
    /// Only `'...'` groups; `"` is an ordinary character.
    #[default]
    SingleOnly,
    /// Both `'...'` and `"..."` group. Inside double quotes `\"` and `\\` are escapes.
    SingleAndDouble,
}

impl Quoting {
    /// Returns true if `ch` opens a quoted segment in this mode.
    pub fn is_quote(self, ch: char) -> bool {
        match self {
            Quoting::SingleOnly => ch == '\'',
            Quoting::SingleAndDouble => ch == '\'' || ch == '"',
        }
    }
}

/// A word produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    /// The word text with quotes removed.
    pub text: String,
    /// Byte offset in the input line just past the last character of this word.
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

struct LexingFSM<'a> {
    line: &'a str,
    input: Vec<(usize, char)>,
    pos: usize,
    quoting: Quoting,
    state: LexingState,
    buffer: String,
    /// Where the currently open quote started: input position just past it,
    /// buffer length before it, and the quote character.
    open: Option<(usize, usize, char)>,
}

impl<'a> LexingFSM<'a> {
    fn new(line: &'a str, quoting: Quoting) -> Self {
        LexingFSM {
            line,
            input: line.char_indices().collect(),
            pos: 0,
            quoting,
            state: LexingState::Start,
            buffer: String::new(),
            open: None,
        }
    }

    /// Runs the machine over the whole line.
    ///
    /// Unquoted blanks end the current word; a quoted segment glued to unquoted
    /// text (`ab'c d'e`) stays part of the same word. A quote that is never closed
    /// is an ordinary character, so `it's fine` is two words, `it's` and `fine`.
    fn make_words(&mut self) -> Vec<Word> {
        let mut out = Vec::new();

        loop {
            while let Some((offset, ch)) = self.read_char() {
                match self.state {
                    LexingState::Start => self.handle_start(ch),
                    LexingState::ReadingWord => self.handle_word(offset, ch, &mut out),
                    LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                    LexingState::ReadingDoubleQuote => self.handle_double_quote(ch),
                }
            }

            match self.state {
                LexingState::ReadingSingleQuote | LexingState::ReadingDoubleQuote => {
                    self.reread_unmatched_quote()
                }
                LexingState::ReadingWord => {
                    self.finish_word(self.line.len(), &mut out);
                    return out;
                }
                LexingState::Start => return out,
            }
        }
    }

    /// Puts the unmatched quote back as a literal and rewinds to just after it.
    fn reread_unmatched_quote(&mut self) {
        if let Some((pos, len, quote)) = self.open.take() {
            self.buffer.truncate(len);
            self.buffer.push(quote);
            self.pos = pos;
        }
        self.state = LexingState::ReadingWord;
    }

    fn read_char(&mut self) -> Option<(usize, char)> {
        let item = self.input.get(self.pos).copied();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).map(|&(_, ch)| ch)
    }

    fn open_quote(&mut self, ch: char) {
        self.open = Some((self.pos, self.buffer.len(), ch));
        self.state = if ch == '\'' {
            LexingState::ReadingSingleQuote
        } else {
            LexingState::ReadingDoubleQuote
        };
    }

    fn handle_start(&mut self, ch: char) {
        match ch {
            ' ' | '\t' => {}
            c if self.quoting.is_quote(c) => self.open_quote(c),
            c => {
                self.buffer.push(c);
                self.state = LexingState::ReadingWord;
            }
        }
    }

    fn handle_word(&mut self, offset: usize, ch: char, out: &mut Vec<Word>) {
        match ch {
            ' ' | '\t' => {
                self.finish_word(offset, out);
                self.state = LexingState::Start;
            }
            c if self.quoting.is_quote(c) => self.open_quote(c),
            c => self.buffer.push(c),
        }
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = LexingState::ReadingWord,
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) {
        match ch {
            '"' => self.state = LexingState::ReadingWord,
            '\\' if matches!(self.peek_char(), Some('"') | Some('\\')) => {
                if let Some((_, escaped)) = self.read_char() {
                    self.buffer.push(escaped);
                }
            }
            c => self.buffer.push(c),
        }
    }

    fn finish_word(&mut self, end: usize, out: &mut Vec<Word>) {
        out.push(Word {
            text: std::mem::take(&mut self.buffer),
            end,
        });
    }
}

/// Splits `line` into words according to `quoting`.
///
/// Runs of blanks separate words and are discarded, so a blank line yields no words.
/// Quotes are removed from the result and their content kept verbatim. An unmatched
/// quote is kept as a literal character.
pub fn tokenize(line: &str, quoting: Quoting) -> Vec<Word> {
    LexingFSM::new(line, quoting).make_words()
}
