//! JSON-lines event input.
//!
//! One event object per line with optional `hits`, `simhits` and
//! `particles` arrays. Blank lines are skipped.

use crate::{Error, Result};
use emtfprep_core::Event;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Streaming reader of JSON-lines events.
pub struct EventReader<R> {
    reader: R,
    line: usize,
    buf: String,
}

impl EventReader<BufReader<File>> {
    /// Opens a JSON-lines event file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> EventReader<R> {
    /// Wraps a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: String::new(),
        }
    }

    /// Number of lines consumed so far.
    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }
}

impl<R: BufRead> Iterator for EventReader<R> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => self.line += 1,
                Err(e) => return Some(Err(e.into())),
            }
            let text = self.buf.trim();
            if text.is_empty() {
                continue;
            }
            return Some(serde_json::from_str(text).map_err(|source| Error::Json {
                line: self.line,
                source,
            }));
        }
    }
}

/// Reads events from several files in order, stopping after `max_events`.
///
/// # Errors
/// Returns the first open, read or parse error.
pub fn read_events<P: AsRef<Path>>(paths: &[P], max_events: Option<usize>) -> Result<Vec<Event>> {
    let limit = max_events.unwrap_or(usize::MAX);
    let mut events = Vec::new();
    for path in paths {
        if events.len() >= limit {
            break;
        }
        let before = events.len();
        for event in EventReader::open(path)? {
            events.push(event?);
            if events.len() >= limit {
                break;
            }
        }
        log::debug!(
            "{}: {} events",
            path.as_ref().display(),
            events.len() - before
        );
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use emtfprep_core::Subsystem;
    use std::io::Cursor;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const EVENTS: &str = r#"{"hits": [{"type": 1, "station": 2, "ring": 1, "endcap": 1, "sector": 3, "cscid": 2, "bx": -1, "emtf_phi": 1200}], "particles": [{"pt": 20.0, "eta": 1.8}]}

{"simhits": [{"type": 4, "station": 1, "ring": 1, "chamber": 5, "phi": 0.5, "theta": 0.3, "z": -560.0}]}
{}
"#;

    #[test]
    fn test_read_json_lines() {
        let events: Vec<Event> = EventReader::new(Cursor::new(EVENTS))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(events.len(), 3);

        let hit = &events[0].hits[0];
        assert_eq!(hit.subsystem, Subsystem::Csc);
        assert_eq!((hit.station, hit.sector, hit.cscid, hit.bx), (2, 3, 2, -1));
        assert_eq!(hit.emtf_phi, 1200);
        assert_eq!(hit.layer, 0);
        assert_eq!(events[0].particles[0].pt, 20.0);

        assert_eq!(events[1].simhits[0].subsystem, Subsystem::Me0);
        assert!(events[1].hits.is_empty());
        assert_eq!(events[2], Event::default());
    }

    #[test]
    fn test_parse_error_names_line() {
        let input = "{}\n\n{\"hits\": 3}\n";
        let mut reader = EventReader::new(Cursor::new(input));
        assert!(reader.next().unwrap().is_ok());
        match reader.next().unwrap() {
            Err(Error::Json { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_read_events_across_files() {
        let mut a = NamedTempFile::new().unwrap();
        writeln!(a, "{{}}\n{{}}").unwrap();
        let mut b = NamedTempFile::new().unwrap();
        writeln!(b, "{{}}\n{{}}\n{{}}").unwrap();
        let paths = [a.path(), b.path()];

        assert_eq!(read_events(&paths, None).unwrap().len(), 5);
        assert_eq!(read_events(&paths, Some(3)).unwrap().len(), 3);
        assert_eq!(read_events(&paths, Some(0)).unwrap().len(), 0);
    }
}
