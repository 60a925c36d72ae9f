//! LIST / MLSD directory listing parser.
//!
//! Recognises MLSD fact lines (`type=file;size=1;modify=20260301100000; name`), Unix
//! `ls -l` lines and Windows/IIS lines. Anything else is ignored.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpEntry {
    pub name: String,
    pub size: Option<u64>,
    pub is_dir: bool,
    pub modified: Option<DateTime<Utc>>,
}

fn unix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([\-dlcbps])[rwxsStT\-]{9}\S*\s+\d+\s+\S+\s+\S+\s+(\d+)\s+\w{3}\s+\d{1,2}\s+[\d:]{4,5}\s+(.+)$")
            .unwrap_or_else(|e| panic!("invalid LIST pattern: {}", e))
    })
}

fn windows_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{2}-\d{2}-\d{2,4}\s+\d{1,2}:\d{2}(?:AM|PM)?\s+(<DIR>|\d+)\s+(.+)$")
            .unwrap_or_else(|e| panic!("invalid LIST pattern: {}", e))
    })
}

pub fn parse_listing(raw: &str) -> Vec<FtpEntry> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(parse_line)
        .filter(|e| e.name != "." && e.name != "..")
        .collect()
}

fn parse_line(line: &str) -> Option<FtpEntry> {
    if line.contains('=') && line.contains(';') {
        if let Some(entry) = parse_mlsd(line) {
            return Some(entry);
        }
    }
    parse_unix(line).or_else(|| parse_windows(line))
}

fn parse_mlsd(line: &str) -> Option<FtpEntry> {
    let (facts, name) = line.split_once("; ")?;
    let mut entry = FtpEntry {
        name: name.trim().to_string(),
        size: None,
        is_dir: false,
        modified: None,
    };
    for fact in facts.split(';') {
        let Some((key, value)) = fact.split_once('=') else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "type" => entry.is_dir = matches!(value.to_ascii_lowercase().as_str(), "dir" | "cdir" | "pdir"),
            "size" => entry.size = value.parse().ok(),
            "modify" => {
                entry.modified = NaiveDateTime::parse_from_str(value.get(..14)?, "%Y%m%d%H%M%S")
                    .ok()
                    .map(|t| t.and_utc())
            }
            _ => {}
        }
    }
    (!entry.name.is_empty()).then_some(entry)
}

fn parse_unix(line: &str) -> Option<FtpEntry> {
    let caps = unix_regex().captures(line)?;
    let kind = caps.get(1)?.as_str();
    let mut name = caps.get(3)?.as_str().to_string();
    if kind == "l" {
        if let Some((link, _target)) = name.split_once(" -> ") {
            name = link.to_string();
        }
    }
    Some(FtpEntry {
        name,
        size: caps.get(2)?.as_str().parse().ok(),
        is_dir: kind == "d",
        modified: None,
    })
}

fn parse_windows(line: &str) -> Option<FtpEntry> {
    let caps = windows_regex().captures(line)?;
    let size_or_dir = caps.get(1)?.as_str();
    Some(FtpEntry {
        name: caps.get(2)?.as_str().to_string(),
        size: size_or_dir.parse().ok(),
        is_dir: size_or_dir == "<DIR>",
        modified: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_listing() {
        let raw = "\
-rw-r--r--    1 root     root      1048576 Mar 01 10:00 clip_20260301100000.mp4\r\n\
drwxr-xr-x    2 root     root         4096 Mar 01 09:00 2026-03-01\r\n\
lrwxrwxrwx    1 root     root           11 Jan  5  2025 latest -> clip001.mp4\r\n\
03-01-26  10:00AM              2048 alarm.dav\r\n\
03-01-26  10:00AM       <DIR>          archive\r\n\
type=file;size=77;modify=20260301101500; motion 01.mp4\r\n\
type=cdir;modify=20260301101500; .\r\n\
total 12\r\n";
        let entries = parse_listing(raw);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["clip_20260301100000.mp4", "2026-03-01", "latest", "alarm.dav", "archive", "motion 01.mp4"]
        );
        assert_eq!(entries[0].size, Some(1_048_576));
        assert!(entries[1].is_dir);
        assert!(entries[4].is_dir && entries[4].size.is_none());
        assert_eq!(entries[5].size, Some(77));
        assert_eq!(
            entries[5].modified.map(|t| t.to_rfc3339()).as_deref(),
            Some("2026-03-01T10:15:00+00:00")
        );
    }
}
