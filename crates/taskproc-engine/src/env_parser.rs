//! Resumable parser for `.command.env`: a line matching `KEY=VALUE` opens
//! a capture, subsequent lines append until a `/KEY/` or
//! `/KEY/=exit:N` closing line. Feeding the parser in arbitrary chunks
//! (including ones that split mid-line) must produce the same captures
//! as feeding it all at once — that's the "resumable across intervening
//! blank lines" property the spec calls out.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvCapture {
    pub value: String,
    pub exit: Option<i32>,
}

#[derive(Debug, Default)]
pub struct CommandEnvParser {
    buffer: String,
    current: Option<(String, Vec<String>)>,
    captures: BTreeMap<String, EnvCapture>,
}

impl CommandEnvParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches('\n').trim_end_matches('\r');
            self.process_line(line);
        }
    }

    /// Flush a trailing line that never got a newline terminator.
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.process_line(&line);
        }
    }

    fn process_line(&mut self, line: &str) {
        if let Some((key, _)) = &self.current {
            let key = key.clone();
            if line == format!("/{key}/") {
                self.finalize_current(None);
                return;
            }
            let close_prefix = format!("/{key}/=exit:");
            if let Some(rest) = line.strip_prefix(close_prefix.as_str()) {
                if let Ok(exit) = rest.parse::<i32>() {
                    self.finalize_current(Some(exit));
                    return;
                }
            }
            if let Some((_, lines)) = &mut self.current {
                lines.push(line.to_string());
            }
            return;
        }

        if let Some(eq) = line.find('=') {
            let key = line[..eq].to_string();
            let value_start = line[eq + 1..].to_string();
            self.current = Some((key, vec![value_start]));
        }
    }

    fn finalize_current(&mut self, exit: Option<i32>) {
        if let Some((key, lines)) = self.current.take() {
            self.captures.insert(
                key,
                EnvCapture {
                    value: lines.join("\n"),
                    exit,
                },
            );
        }
    }

    pub fn captures(&self) -> &BTreeMap<String, EnvCapture> {
        &self.captures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_capture() {
        let mut parser = CommandEnvParser::new();
        parser.feed("FOO=bar\n/FOO/\n");
        assert_eq!(parser.captures()["FOO"].value, "bar");
        assert_eq!(parser.captures()["FOO"].exit, None);
    }

    #[test]
    fn multiline_capture_joins_with_newlines() {
        let mut parser = CommandEnvParser::new();
        parser.feed("FOO=line1\nline2\nline3\n/FOO/\n");
        assert_eq!(parser.captures()["FOO"].value, "line1\nline2\nline3");
    }

    #[test]
    fn cmd_eval_capture_records_exit_code() {
        let mut parser = CommandEnvParser::new();
        parser.feed("RESULT=42\n/RESULT/=exit:7\n");
        assert_eq!(parser.captures()["RESULT"].value, "42");
        assert_eq!(parser.captures()["RESULT"].exit, Some(7));
    }

    #[test]
    fn resumes_across_arbitrary_chunk_boundaries() {
        let mut whole = CommandEnvParser::new();
        whole.feed("A=1\n/A/\nB=2\n/B/\n");

        let mut chunked = CommandEnvParser::new();
        chunked.feed("A=1\n/A");
        chunked.feed("/\nB=2\n/B");
        chunked.feed("/\n");

        assert_eq!(whole.captures(), chunked.captures());
    }

    #[test]
    fn multiple_captures_are_independent() {
        let mut parser = CommandEnvParser::new();
        parser.feed("A=1\n/A/\nB=2\n/B/\n");
        assert_eq!(parser.captures().len(), 2);
        assert_eq!(parser.captures()["A"].value, "1");
        assert_eq!(parser.captures()["B"].value, "2");
    }
}
