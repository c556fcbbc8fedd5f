//! Duration probing and reverse encoding of finished assets.

use super::exec::CommandExecutor;
use crate::defaults;
use crate::error::{DictapiError, Result};
use crate::timeline::Millis;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Determines the length of an audio file.
pub trait Prober: Send + Sync {
    fn duration(&self, path: &Path) -> Result<Millis>;
}

/// Produces a time-reversed copy of an audio file.
pub trait Encoder: Send + Sync {
    fn reverse(&self, src: &Path, dst: &Path) -> Result<()>;
}

/// Where the reverse rendition of `asset` lives: `<stem>.reverse.<ext>`.
pub fn reverse_path(asset: &Path) -> PathBuf {
    let stem = asset
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match asset.extension() {
        Some(ext) => format!(
            "{stem}.{}.{}",
            defaults::REVERSE_INFIX,
            ext.to_string_lossy()
        ),
        None => format!("{stem}.{}", defaults::REVERSE_INFIX),
    };
    asset.with_file_name(name)
}

/// Extracts the duration from `soxi` output.
///
/// Looks for `Duration : HH:MM:SS.ff = ...`; the fraction may have any number
/// of digits and is read as milliseconds.
pub fn parse_soxi_duration(output: &str) -> Option<Millis> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("Duration"))?;
    let (_, value) = line.split_once(':')?;
    let stamp = value.split_whitespace().next()?;

    let mut fields = stamp.splitn(3, ':');
    let hours: u64 = fields.next()?.parse().ok()?;
    let minutes: u64 = fields.next()?.parse().ok()?;
    let seconds = fields.next()?;
    let (whole, fraction) = seconds.split_once('.').unwrap_or((seconds, ""));
    let whole: u64 = whole.parse().ok()?;

    let mut millis = String::from(fraction);
    millis.truncate(3);
    while millis.len() < 3 {
        millis.push('0');
    }
    if !millis.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let millis: u64 = millis.parse().ok()?;

    Some(((hours * 60 + minutes) * 60 + whole) * 1000 + millis)
}

/// Prober running `soxi <file>`.
pub struct SoxiProber<E: CommandExecutor> {
    executor: E,
    program: String,
}

impl<E: CommandExecutor> SoxiProber<E> {
    pub fn new(executor: E, program: impl Into<String>) -> Self {
        Self {
            executor,
            program: program.into(),
        }
    }
}

impl<E: CommandExecutor> Prober for SoxiProber<E> {
    fn duration(&self, path: &Path) -> Result<Millis> {
        let path_str = path.to_string_lossy();
        let output = self.executor.execute(&self.program, &[&path_str])?;
        parse_soxi_duration(&output).ok_or_else(|| DictapiError::Probe {
            path: path_str.into_owned(),
            message: format!("no duration in {} output", self.program),
        })
    }
}

/// Prober reading the header of a WAV file.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavProber;

impl Prober for WavProber {
    fn duration(&self, path: &Path) -> Result<Millis> {
        let reader = hound::WavReader::open(path).map_err(|e| DictapiError::Probe {
            path: path.display().to_string(),
            message: format!("Failed to parse WAV file: {}", e),
        })?;
        let rate = u64::from(reader.spec().sample_rate);
        if rate == 0 {
            return Err(DictapiError::Probe {
                path: path.display().to_string(),
                message: "sample rate is zero".to_string(),
            });
        }
        Ok(u64::from(reader.duration()) * 1000 / rate)
    }
}

/// Uses the WAV header reader for `.wav` files and the external prober
/// for everything else.
pub struct MediaProber<P: Prober> {
    external: P,
    native_wav: bool,
}

impl<P: Prober> MediaProber<P> {
    pub fn new(external: P, native_wav: bool) -> Self {
        Self {
            external,
            native_wav,
        }
    }
}

impl<P: Prober> Prober for MediaProber<P> {
    fn duration(&self, path: &Path) -> Result<Millis> {
        let is_wav = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
        if self.native_wav && is_wav {
            debug!(path = %path.display(), "probing WAV header");
            WavProber.duration(path)
        } else {
            self.external.duration(path)
        }
    }
}

/// Encoder running `sox <src> <dst> reverse`.
pub struct SoxReverseEncoder<E: CommandExecutor> {
    executor: E,
    program: String,
}

impl<E: CommandExecutor> SoxReverseEncoder<E> {
    pub fn new(executor: E, program: impl Into<String>) -> Self {
        Self {
            executor,
            program: program.into(),
        }
    }
}

impl<E: CommandExecutor> Encoder for SoxReverseEncoder<E> {
    fn reverse(&self, src: &Path, dst: &Path) -> Result<()> {
        let src = src.to_string_lossy();
        let dst = dst.to_string_lossy();
        self.executor
            .execute(&self.program, &[&src, &dst, "reverse"])
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct ScriptedExecutor {
        output: String,
        calls: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl CommandExecutor for ScriptedExecutor {
        fn execute(&self, command: &str, args: &[&str]) -> Result<String> {
            let mut call = vec![command.to_string()];
            call.extend(args.iter().map(|a| a.to_string()));
            self.calls.lock().unwrap().push(call);
            Ok(self.output.clone())
        }
    }

    const SOXI_OUTPUT: &str = "\
Input File     : 'take.mp3'
Channels       : 1
Sample Rate    : 44100
Precision      : 16-bit
Duration       : 00:01:03.57 = 2803437 samples ~ 4767.75 CDDA sectors
File Size      : 1.02M
Bit Rate       : 128k
";

    #[test]
    fn test_parse_soxi_duration() {
        assert_eq!(parse_soxi_duration(SOXI_OUTPUT), Some(63_570));
    }

    #[test]
    fn test_parse_soxi_duration_fraction_lengths() {
        assert_eq!(
            parse_soxi_duration("Duration : 00:00:02.5 = 1 samples"),
            Some(2_500)
        );
        assert_eq!(
            parse_soxi_duration("Duration : 01:00:00.123456 = 1 samples"),
            Some(3_600_123)
        );
        assert_eq!(parse_soxi_duration("Duration : 00:00:07"), Some(7_000));
    }

    #[test]
    fn test_parse_soxi_duration_rejects_garbage() {
        assert_eq!(parse_soxi_duration("Channels : 2"), None);
        assert_eq!(parse_soxi_duration("Duration : unknown"), None);
        assert_eq!(parse_soxi_duration(""), None);
    }

    #[test]
    fn test_soxi_prober_runs_program_on_path() {
        let executor = ScriptedExecutor {
            output: SOXI_OUTPUT.to_string(),
            ..Default::default()
        };
        let prober = SoxiProber::new(executor.clone(), "soxi");

        let duration = prober.duration(Path::new("/rec/take.mp3")).unwrap();

        assert_eq!(duration, 63_570);
        assert_eq!(
            executor.calls.lock().unwrap()[0],
            vec!["soxi", "/rec/take.mp3"]
        );
    }

    #[test]
    fn test_soxi_prober_reports_unparseable_output() {
        let prober = SoxiProber::new(ScriptedExecutor::default(), "soxi");
        let err = prober.duration(Path::new("x.mp3")).unwrap_err();
        assert!(matches!(err, DictapiError::Probe { .. }));
    }

    #[test]
    fn test_wav_prober_reads_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..12_000 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        assert_eq!(WavProber.duration(&path).unwrap(), 1_500);
        let media = MediaProber::new(SoxiProber::new(ScriptedExecutor::default(), "soxi"), true);
        assert_eq!(media.duration(&path).unwrap(), 1_500);
    }

    #[test]
    fn test_media_prober_uses_external_for_other_formats() {
        let executor = ScriptedExecutor {
            output: SOXI_OUTPUT.to_string(),
            ..Default::default()
        };
        let media = MediaProber::new(SoxiProber::new(executor.clone(), "soxi"), true);

        assert_eq!(media.duration(Path::new("a.mp3")).unwrap(), 63_570);
        assert_eq!(executor.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_reverse_encoder_arguments() {
        let executor = ScriptedExecutor::default();
        let encoder = SoxReverseEncoder::new(executor.clone(), "sox");

        encoder
            .reverse(Path::new("a.mp3"), Path::new("a.reverse.mp3"))
            .unwrap();

        assert_eq!(
            executor.calls.lock().unwrap()[0],
            vec!["sox", "a.mp3", "a.reverse.mp3", "reverse"]
        );
    }

    #[test]
    fn test_reverse_path() {
        assert_eq!(
            reverse_path(Path::new("/rec/2024-01-01.mp3")),
            PathBuf::from("/rec/2024-01-01.reverse.mp3")
        );
        assert_eq!(
            reverse_path(Path::new("take")),
            PathBuf::from("take.reverse")
        );
    }
}
