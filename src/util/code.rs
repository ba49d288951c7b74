use super::{Position, SourceText};
use once_cell::unsync::OnceCell;

impl SourceText {
    pub fn new(filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            text: text.into(),
            line_starts: OnceCell::new(),
        }
    }

    /// Byte offsets of the first character of every line, lines[0] == 0.
    fn obtain_line_starts(&self) -> &Vec<usize> {
        self.line_starts.get_or_init(|| {
            let mut starts = vec![0];
            starts.extend(
                self.text
                    .bytes()
                    .enumerate()
                    .filter_map(|(index, b)| if b == b'\n' { Some(index + 1) } else { None }),
            );
            starts
        })
    }

    /// Recover a 1-based (line, column) for a byte offset into `text`.
    pub fn position_at_byte(&self, offset: usize) -> Position {
        let line_starts = self.obtain_line_starts();
        let line = match line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index.saturating_sub(1),
        };
        let column = offset - line_starts[line] + 1;
        Position::new(line + 1, column)
    }
}
