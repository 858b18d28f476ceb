use std::fmt;
use std::fs;
use std::io::{self, BufRead};

use crate::source::{Data, Source};

// A runaway replacement (one that produces its own token) stops after this many substitutions
const MAX_REPLACEMENTS: usize = 1000;

enum Reader<'a> {
    File(io::BufReader<fs::File>),
    String(&'a [u8]),
}

/// Reads logical lines from a [`Source`].
///
/// Lines ending with `\` are joined with the next line, and the token replacements of the
/// source are applied.
pub struct Stream<'a> {
    source: &'a Source,
    reader: Reader<'a>,
    line_num: usize,
    next_line_num: usize,
}

#[derive(Debug)]
pub enum StreamError {
    Io(io::Error),
    TokenReplacementLoop,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StreamError::Io(e) => e.fmt(f),
            StreamError::TokenReplacementLoop => {
                write!(f, "the token replacements cause an infinite loop")
            },
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StreamError::Io(e) => Some(e),
            StreamError::TokenReplacementLoop => None,
        }
    }
}

impl From<io::Error> for StreamError {
    fn from(e: io::Error) -> StreamError {
        StreamError::Io(e)
    }
}

impl<'a> Stream<'a> {
    pub fn new(source: &'a Source) -> Result<Stream<'a>, StreamError> {
        let reader = match source.data() {
            Data::File { filename } => Reader::File(io::BufReader::new(fs::File::open(filename)?)),
            Data::String { source } => Reader::String(source.as_bytes()),
        };

        Ok(Stream { source, reader, line_num: 0, next_line_num: 1 })
    }

    /// Appends the next logical line to `line`, including its terminator. Returns the number of
    /// bytes appended, which is zero at the end of the source.
    pub fn read_line(&mut self, line: &mut String) -> Result<usize, StreamError> {
        let start = line.len();
        self.line_num = self.next_line_num;

        loop {
            let length = match &mut self.reader {
                Reader::File(r) => r.read_line(line)?,
                Reader::String(r) => r.read_line(line)?,
            };

            if length == 0 {
                break;
            }

            self.next_line_num += 1;

            if line.ends_with("\\\n") {
                line.truncate(line.len() - 2);
            } else if line.ends_with("\\\r\n") {
                line.truncate(line.len() - 3);
            } else {
                break;
            }
        }

        self.replace_tokens(line, start)?;

        Ok(line.len() - start)
    }

    /// Line number where the last line returned by `read_line` started.
    pub fn line_num(&self) -> usize {
        self.line_num
    }

    fn replace_tokens(&self, line: &mut String, start: usize) -> Result<(), StreamError> {
        let replacements = self.source.token_replacements();

        if replacements.is_empty() {
            return Ok(());
        }

        let mut count = 0;
        let mut pos = start;

        while pos < line.len() {
            match replacements.iter().find(|r| line[pos..].starts_with(&r.token[..])) {
                Some(r) => {
                    count += 1;
                    if count >= MAX_REPLACEMENTS {
                        return Err(StreamError::TokenReplacementLoop);
                    }
                    // stay at `pos` so the replacement text is scanned again
                    line.replace_range(pos..pos + r.token.len(), &r.replacement);
                },
                None => {
                    pos += line[pos..].chars().next().map_or(1, char::len_utf8);
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(source: &Source) -> Result<Vec<(usize, String)>, StreamError> {
        let mut stream = Stream::new(source)?;
        let mut lines = Vec::new();

        loop {
            let mut line = String::new();
            if stream.read_line(&mut line)? == 0 {
                break Ok(lines);
            }
            lines.push((stream.line_num(), line));
        }
    }

    #[test]
    fn continuations() {
        let source = Source::from_string("one\ntwo \\\n  still two\\\r\nend\nthree");
        let lines = read_all(&source).unwrap();

        assert_eq!(lines, [
            (1, "one\n".to_owned()),
            (2, "two   still twoend\n".to_owned()),
            (5, "three".to_owned()),
        ]);
    }

    #[test]
    fn replacements() {
        let mut source = Source::from_string("probe all rgba COLOR\nCOLORCOLOR\n");
        source.add_token_replacement("COLOR", "RED 1");
        source.add_token_replacement("RED", "1 0 0");
        let lines = read_all(&source).unwrap();

        assert_eq!(lines[0].1, "probe all rgba 1 0 0 1\n");
        assert_eq!(lines[1].1, "1 0 0 11 0 0 1\n");
    }

    #[test]
    fn replacement_loop() {
        let mut source = Source::from_string("x\n");
        source.add_token_replacement("x", "xx");

        assert!(matches!(read_all(&source), Err(StreamError::TokenReplacementLoop)));
    }

    #[test]
    fn missing_file() {
        let source = Source::from_file("/nonexistent/really.shader_test");
        assert!(matches!(Stream::new(&source), Err(StreamError::Io(_))));
    }
}
