//! Line-oriented command language.
//!
//! The same syntax is read from the interactive prompt, from scripts passed
//! to `open`, and written by the transcript, so a transcript can be replayed.
//!
//! ```text
//! play | record | pause | resume | stop | reset
//! speed 1.5 | speed -2 | speed 150% | speed by 0.25
//! seek 1500 | seek 1m30s | seek 2:03.5 | seek +5s | seek -500ms | seek #10s
//! seek_marker [N] | set_marker [LABEL] | rm_marker
//! delete [FROM TO]
//! load PATH | open PATH
//! dump | status | quit
//! ```
//!
//! Blank lines and lines starting with `#` are ignored; a leading
//! `<timestamp> > ` as written by the transcript is stripped.

use crate::error::{DictapiError, Result};
use crate::timeline::Millis;
use crate::transport::{SeekTarget, SpeedChange};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Record,
    Pause,
    Resume,
    Stop,
    Speed(SpeedChange),
    Seek(SeekTarget),
    SeekMarker(i32),
    SetMarker(Option<String>),
    RemoveMarker,
    Delete(Option<(Millis, Millis)>),
    Reset,
    Load(PathBuf),
    Open(PathBuf),
    Dump,
    Status,
    Quit,
}

/// Parses one line; `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<Command>> {
    let text = strip_timestamp(line).trim();
    if text.is_empty() || text.starts_with('#') {
        return Ok(None);
    }

    let (word, rest) = match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (text, ""),
    };
    let fail = |message: &str| DictapiError::Parse {
        line: text.to_string(),
        message: message.to_string(),
    };
    let no_args = |command: Command| {
        if rest.is_empty() {
            Ok(command)
        } else {
            Err(fail("unexpected arguments"))
        }
    };

    let command = match word {
        "play" => no_args(Command::Play)?,
        "record" => no_args(Command::Record)?,
        "pause" => no_args(Command::Pause)?,
        "resume" => no_args(Command::Resume)?,
        "stop" => no_args(Command::Stop)?,
        "reset" => no_args(Command::Reset)?,
        "rm_marker" | "remove_marker" => no_args(Command::RemoveMarker)?,
        "dump" => no_args(Command::Dump)?,
        "status" => no_args(Command::Status)?,
        "quit" | "exit" => no_args(Command::Quit)?,
        "speed" => Command::Speed(parse_speed(rest).map_err(|m| fail(&m))?),
        "seek" => Command::Seek(parse_seek(rest).map_err(|m| fail(&m))?),
        "seek_marker" => {
            let count = if rest.is_empty() {
                0
            } else {
                rest.parse()
                    .map_err(|_| fail("marker count must be an integer"))?
            };
            Command::SeekMarker(count)
        }
        "set_marker" => Command::SetMarker((!rest.is_empty()).then(|| rest.to_string())),
        "delete" => {
            let args: Vec<&str> = rest.split_whitespace().collect();
            match args.as_slice() {
                [] => Command::Delete(None),
                [from, to] => {
                    let from = parse_time(from).map_err(|m| fail(&m))?;
                    let to = parse_time(to).map_err(|m| fail(&m))?;
                    Command::Delete(Some((from, to)))
                }
                _ => return Err(fail("delete takes no arguments or FROM TO")),
            }
        }
        "load" | "open" => {
            if rest.is_empty() {
                return Err(fail("missing path"));
            }
            let path = PathBuf::from(rest);
            if word == "load" {
                Command::Load(path)
            } else {
                Command::Open(path)
            }
        }
        _ => return Err(fail("unknown command")),
    };
    Ok(Some(command))
}

/// Drops a `<timestamp> > ` prefix written by the transcript.
fn strip_timestamp(line: &str) -> &str {
    match line.split_once(" > ") {
        Some((stamp, rest))
            if stamp.trim_start().starts_with(|c: char| c.is_ascii_digit())
                && !stamp.trim().contains(char::is_whitespace) =>
        {
            rest
        }
        _ => line,
    }
}

fn parse_speed(args: &str) -> std::result::Result<SpeedChange, String> {
    let (relative, value) = match args.strip_prefix("by") {
        Some(rest) if rest.starts_with(char::is_whitespace) => (true, rest.trim()),
        _ => (false, args),
    };
    let (percent, number) = match value.strip_suffix('%') {
        Some(number) if !relative => (true, number),
        _ => (false, value),
    };
    let parsed: f64 = number
        .parse()
        .map_err(|_| format!("invalid speed `{value}`"))?;
    if !parsed.is_finite() {
        return Err(format!("invalid speed `{value}`"));
    }
    let value = if percent { parsed / 100.0 } else { parsed };
    Ok(if relative {
        SpeedChange::Relative(value)
    } else {
        SpeedChange::Absolute(value)
    })
}

fn parse_seek(args: &str) -> std::result::Result<SeekTarget, String> {
    if args.is_empty() {
        return Err("missing position".to_string());
    }
    if let Some(rest) = args.strip_prefix('+') {
        return parse_time(rest).map(SeekTarget::Forward);
    }
    if let Some(rest) = args.strip_prefix('-') {
        return parse_time(rest).map(SeekTarget::Backward);
    }
    if let Some(rest) = args.strip_prefix('#') {
        return parse_time(rest).map(SeekTarget::FromEnd);
    }
    parse_time(args).map(SeekTarget::Absolute)
}

/// Parses a time value into milliseconds.
///
/// Accepts bare milliseconds (`1500`), clock notation (`2:03.5`,
/// `1:02:03`) and anything `humantime` understands (`1m30s`, `250ms`).
pub fn parse_time(s: &str) -> std::result::Result<Millis, String> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<Millis>() {
        return Ok(ms);
    }
    if s.contains(':') {
        return parse_clock(s).ok_or_else(|| format!("invalid time `{s}`"));
    }
    humantime::parse_duration(s)
        .map(|d| Millis::try_from(d.as_millis()).unwrap_or(Millis::MAX))
        .map_err(|e| format!("invalid time `{s}`: {e}"))
}

fn parse_clock(s: &str) -> Option<Millis> {
    let fields: Vec<&str> = s.split(':').collect();
    let (hours, minutes, seconds) = match fields.as_slice() {
        [m, sec] => ("0", *m, *sec),
        [h, m, sec] => (*h, *m, *sec),
        _ => return None,
    };
    let hours: Millis = hours.parse().ok()?;
    let minutes: Millis = minutes.parse().ok()?;
    let (whole, fraction) = seconds.split_once('.').unwrap_or((seconds, ""));
    let whole: Millis = whole.parse().ok()?;
    if fraction.len() > 3 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let millis: Millis = if fraction.is_empty() {
        0
    } else {
        format!("{fraction:0<3}").parse().ok()?
    };
    hours
        .checked_mul(60)?
        .checked_add(minutes)?
        .checked_mul(60)?
        .checked_add(whole)?
        .checked_mul(1000)?
        .checked_add(millis)
}
