//! Recorded entry/exit events and their text log format
//!
//! One event per line:
//!
//! ```text
//! # comment
//! enter <cycles> <call site>
//! leave <cycles>
//! ```
//!
//! Call sites are `0x`-prefixed hex or decimal. Blank lines and lines
//! starting with `#` are ignored.

use crate::call_node::CallSiteId;
use crate::error::{ProfilerError, Result};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

/// A single instrumentation event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum Event {
    /// A function was entered at `time` through `site`
    Enter { time: u64, site: CallSiteId },
    /// The innermost function returned at `time`
    Leave { time: u64 },
}

impl Event {
    /// Cycle counter value carried by the event
    pub fn time(&self) -> u64 {
        match *self {
            Event::Enter { time, .. } | Event::Leave { time } => time,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Enter { time, site } => write!(f, "enter {} {}", time, site),
            Event::Leave { time } => write!(f, "leave {}", time),
        }
    }
}

/// An ordered sequence of recorded events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Parse the text log format
    pub fn parse(content: &str) -> Result<Self> {
        let mut events = Vec::new();

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            events.push(parse_line(line).map_err(|reason| ProfilerError::EventParse {
                line: index + 1,
                reason,
            })?);
        }

        Ok(Self { events })
    }

    /// Read and parse a log file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Write the log in the same text format `parse` accepts
    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        for event in &self.events {
            writeln!(out, "{}", event)?;
        }
        Ok(())
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl IntoIterator for EventLog {
    type Item = Event;
    type IntoIter = std::vec::IntoIter<Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl FromIterator<Event> for EventLog {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

fn parse_line(line: &str) -> std::result::Result<Event, String> {
    let mut fields = line.split_whitespace();
    let kind = fields.next().unwrap_or_default();

    let time = fields
        .next()
        .ok_or_else(|| format!("missing timestamp for '{}'", kind))?;
    let time: u64 = time
        .parse()
        .map_err(|e| format!("invalid timestamp '{}': {}", time, e))?;

    let event = match kind {
        "enter" => {
            let site = fields
                .next()
                .ok_or_else(|| "missing call site for 'enter'".to_string())?;
            let site: CallSiteId = site
                .parse()
                .map_err(|e| format!("invalid call site '{}': {}", site, e))?;
            Event::Enter { time, site }
        }
        "leave" => Event::Leave { time },
        other => return Err(format!("unknown event kind '{}'", other)),
    };

    if let Some(extra) = fields.next() {
        return Err(format!("unexpected trailing field '{}'", extra));
    }

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_enter_and_leave() {
        let log = EventLog::parse("enter 0 0x401000\nleave 25\n").unwrap();
        assert_eq!(
            log.events(),
            &[
                Event::Enter {
                    time: 0,
                    site: CallSiteId::new(0x401000)
                },
                Event::Leave { time: 25 },
            ]
        );
    }

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let log = EventLog::parse("# header\n\n   \nenter 1 42\n  # inline\nleave 2").unwrap();
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = EventLog::parse("enter 0 0x10\nhop 5\n").unwrap_err();
        match err {
            ProfilerError::EventParse { line, reason } => {
                assert_eq!(line, 2);
                assert!(reason.contains("hop"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_missing_site() {
        assert!(EventLog::parse("enter 10").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_timestamp() {
        assert!(EventLog::parse("leave -3").is_err());
        assert!(EventLog::parse("leave").is_err());
    }

    #[test]
    fn test_parse_rejects_trailing_fields() {
        assert!(EventLog::parse("leave 3 0x10").is_err());
    }

    #[test]
    fn test_write_uses_parseable_format() {
        let log = EventLog::new(vec![
            Event::Enter {
                time: 7,
                site: CallSiteId::new(0xabc),
            },
            Event::Leave { time: 9 },
        ]);
        let mut out = Vec::new();
        log.write(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(text, "enter 7 0xabc\nleave 9\n");
        assert_eq!(EventLog::parse(&text).unwrap(), log);
    }

    #[test]
    fn test_event_time() {
        assert_eq!(Event::Leave { time: 4 }.time(), 4);
    }
}
