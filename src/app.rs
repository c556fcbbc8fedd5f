//! Interactive session entry point.
//!
//! Builds a [`Session`] from configuration and feeds it commands read
//! line by line, interleaved with player exit notifications.

use crate::command::{Command, parse_line};
use crate::config::Config;
use crate::media::MediaTools;
use crate::transport::{CommandLog, Session, WriterCommandLog};
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, select, unbounded};
use serde::Serialize;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::thread;
use tracing::{debug, info, warn};

/// Creates the audio directory and the transcript sink, then the session.
pub fn build_session(config: &Config, tools: MediaTools) -> Result<Session> {
    fs::create_dir_all(&config.audio.dir).with_context(|| {
        format!(
            "Failed to create audio directory {}",
            config.audio.dir.display()
        )
    })?;

    let timestamps = config.transcript.timestamps;
    let log: Box<dyn CommandLog> = match &config.transcript.path {
        Some(path) => Box::new(
            WriterCommandLog::append_to(path, timestamps)
                .with_context(|| format!("Failed to open transcript {}", path.display()))?,
        ),
        None => Box::new(WriterCommandLog::stdout(timestamps)),
    };

    Ok(Session::from_config(config, tools, log))
}

/// Runs an interactive session on stdin/stdout until `quit` or end of input.
pub fn run_session(config: Config, script: Option<&Path>) -> Result<()> {
    let tools = MediaTools::from_config(&config.tools);
    let mut session = build_session(&config, tools)?;

    if let Some(script) = script {
        session
            .open(script)
            .with_context(|| format!("Failed to open {}", script.display()))?;
        info!(
            script = %script.display(),
            total = session.timeline().total_duration(),
            "session restored"
        );
    }

    run_commands(
        &mut session,
        BufReader::new(io::stdin()),
        &mut io::stdout(),
    )
}

/// Reads commands from `input` and executes them against `session`.
///
/// Player exits are handled as they arrive, so playback continues across
/// slices while the prompt is idle. `status` and `dump` write one JSON
/// document per line to `output`.
pub fn run_commands<R>(session: &mut Session, input: R, output: &mut dyn Write) -> Result<()>
where
    R: BufRead + Send + 'static,
{
    let lines = spawn_line_reader(input);
    let events = session.events();

    loop {
        select! {
            recv(lines) -> line => match line {
                Ok(line) => {
                    let line = line.context("Failed to read command")?;
                    if !handle_line(session, &line, output)? {
                        debug!("quit requested");
                        break;
                    }
                }
                Err(_) => {
                    debug!("end of input");
                    break;
                }
            },
            recv(events) -> event => {
                if let Ok(event) = event {
                    session.handle_event(event);
                }
            }
        }
    }
    Ok(())
}

fn spawn_line_reader<R>(input: R) -> Receiver<io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for line in input.lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Returns `false` when the session should end.
fn handle_line(session: &mut Session, line: &str, output: &mut dyn Write) -> Result<bool> {
    let command = match parse_line(line) {
        Ok(Some(command)) => command,
        Ok(None) => return Ok(true),
        Err(e) => {
            warn!("{e}");
            return Ok(true);
        }
    };

    match command {
        Command::Quit => return Ok(false),
        Command::Status => write_json(output, &session.status())?,
        Command::Dump => {
            let dump = session.dump().context("Failed to serialize session")?;
            write_json(output, &dump)?;
        }
        command => {
            // Failures were already reported by the session.
            if let Err(e) = session.execute(&command) {
                debug!(?command, "command failed: {e}");
            }
        }
    }
    Ok(true)
}

fn write_json<T: Serialize>(output: &mut dyn Write, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *output, value)?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::mock::{MockEncoder, MockPlayer, MockProber, MockRecorder};
    use crate::transport::{MemoryCommandLog, StateKind, TransportSettings};
    use std::io::Cursor;
    use std::sync::Arc;

    fn mock_session(player: &MockPlayer, log: &MemoryCommandLog) -> Session {
        let tools = MediaTools {
            recorder: Arc::new(MockRecorder::new()),
            player: Arc::new(player.clone()),
            prober: Arc::new(MockProber::new(3_000)),
            encoder: Arc::new(MockEncoder::new()),
        };
        Session::new(TransportSettings::default(), tools, Box::new(log.clone()))
    }

    fn run(session: &mut Session, script: &str) -> String {
        let mut output = Vec::new();
        run_commands(session, Cursor::new(script.to_string()), &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_commands_drive_session_until_quit() {
        let player = MockPlayer::new();
        let log = MemoryCommandLog::new();
        let mut session = mock_session(&player, &log);

        let output = run(
            &mut session,
            "load take.wav\n# comment\nseek 1s\nstatus\nquit\nplay\n",
        );

        let status: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(status["state"], "Stopped");
        assert_eq!(status["timecode"], 1_000);
        assert_eq!(session.state(), StateKind::Stopped);
        assert!(player.launches().is_empty());
        assert_eq!(log.lines(), vec!["load take.wav", "seek 1000"]);
    }

    #[test]
    fn test_bad_lines_do_not_end_session() {
        let player = MockPlayer::new();
        let log = MemoryCommandLog::new();
        let mut session = mock_session(&player, &log);

        let output = run(&mut session, "fly away\nplay\nload a.wav\ndump\n");

        assert_eq!(session.state(), StateKind::Stopped);
        let dump: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(dump["timeline"]["total"], 3_000);
    }

    #[test]
    fn test_build_session_creates_audio_dir_and_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.audio.dir = dir.path().join("takes");
        config.transcript.path = Some(dir.path().join("session.log"));
        config.transcript.timestamps = false;
        let tools = MediaTools {
            recorder: Arc::new(MockRecorder::new()),
            player: Arc::new(MockPlayer::new()),
            prober: Arc::new(MockProber::new(2_000)),
            encoder: Arc::new(MockEncoder::new()),
        };

        let mut session = build_session(&config, tools).unwrap();
        session.load(Path::new("a.wav")).unwrap();
        drop(session);

        assert!(config.audio.dir.is_dir());
        let transcript = fs::read_to_string(dir.path().join("session.log")).unwrap();
        assert_eq!(transcript, "load a.wav\n");
    }
}
