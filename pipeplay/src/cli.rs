//! Command-line surface.
//!
//! Numeric arguments are taken as text and checked by hand: a negative or
//! unparsable value is reported on stderr and replaced with the default
//! rather than aborting. Unknown flags and missing arguments are clap errors.

use std::time::Duration;

use clap::Parser;
use pipeplay_core::{EngineFeature, PlayerConfig, SampleFormat, StreamFlags};

const DEFAULT_VERBOSITY: u8 = 1;

/// Play raw interleaved PCM from standard input on the default output device.
#[derive(Parser, Debug)]
#[command(name = "pipeplay")]
#[command(about = "Play raw PCM from standard input on the default audio device")]
pub struct Args {
    /// Number of channels (integer, at most 65535), default: 1
    #[arg(short = 'c', value_name = "channels", allow_hyphen_values = true)]
    channels: Option<String>,

    /// Sample format (f, s16, s32, s24, s8, u8), default: u8
    #[arg(short = 'f', value_name = "sample format", allow_hyphen_values = true)]
    format: Option<String>,

    /// Sample rate (floating point), default: 22256.0
    #[arg(short = 'r', value_name = "sample rate", allow_hyphen_values = true)]
    rate: Option<String>,

    /// Buffer size in frames (integer), default: 370
    #[arg(short = 'b', value_name = "buffer size", allow_hyphen_values = true)]
    buffer: Option<String>,

    /// Feature to disable (clipping, dithering), may be repeated
    #[arg(short = 'd', value_name = "feature", allow_hyphen_values = true)]
    disable: Vec<String>,

    /// Seconds without new data before exiting (floating point), default: forever
    #[arg(short = 't', value_name = "timeout", allow_hyphen_values = true)]
    timeout: Option<String>,

    /// Log verbosity level (integer, 5 and above log everything), default: 1
    #[arg(short = 'v', value_name = "level", allow_hyphen_values = true)]
    verbosity: Option<String>,
}

/// Everything the binary needs after argument parsing.
#[derive(Debug)]
pub struct Settings {
    pub config: PlayerConfig,
    pub verbosity: u8,
    /// Messages about rejected arguments, one line each.
    pub warnings: Vec<String>,
}

impl Args {
    pub fn into_settings(self) -> Settings {
        let defaults = PlayerConfig::default();
        let mut warnings = Vec::new();

        let channels = self
            .channels
            .map(|raw| int_arg('c', &raw, defaults.channels, u16::MAX, &mut warnings))
            .unwrap_or(defaults.channels);

        let sample_format = match self.format {
            None => defaults.sample_format,
            Some(raw) => raw.parse::<SampleFormat>().unwrap_or_else(|_| {
                warnings.push(format!(
                    "argument {raw} to option '-f' is invalid, using default: {}",
                    defaults.sample_format
                ));
                defaults.sample_format
            }),
        };

        let sample_rate = self
            .rate
            .map(|raw| float_arg('r', &raw, defaults.sample_rate, &mut warnings))
            .unwrap_or(defaults.sample_rate);

        let frames_per_buffer = self
            .buffer
            .map(|raw| {
                int_arg('b', &raw, defaults.frames_per_buffer, u32::MAX, &mut warnings)
            })
            .unwrap_or(defaults.frames_per_buffer);

        let mut stream_flags = StreamFlags::default();
        for raw in self.disable {
            match raw.parse::<EngineFeature>() {
                Ok(feature) => stream_flags.disable(feature),
                Err(_) => warnings.push(format!("argument {raw} to option '-d' is invalid")),
            }
        }

        let idle_timeout = self.timeout.and_then(|raw| {
            let secs = float_arg('t', &raw, f64::INFINITY, &mut warnings);
            Duration::try_from_secs_f64(secs).ok()
        });

        let verbosity = self
            .verbosity
            .map(|raw| int_arg('v', &raw, DEFAULT_VERBOSITY, u8::MAX, &mut warnings))
            .unwrap_or(DEFAULT_VERBOSITY);

        Settings {
            config: PlayerConfig {
                channels,
                sample_format,
                sample_rate,
                frames_per_buffer,
                stream_flags,
                idle_timeout,
            },
            verbosity,
            warnings,
        }
    }
}

/// Non-negative integers above `max` saturate to it.
fn int_arg<T>(opt: char, raw: &str, default: T, max: T, warnings: &mut Vec<String>) -> T
where
    T: TryFrom<u64> + std::fmt::Display + Copy,
{
    match raw.trim().parse::<i64>() {
        Ok(value) if value >= 0 => T::try_from(value.unsigned_abs()).unwrap_or(max),
        _ => {
            warnings.push(format!(
                "argument {raw} to option '-{opt}' is invalid, using default: {default}"
            ));
            default
        }
    }
}

fn float_arg(opt: char, raw: &str, default: f64, warnings: &mut Vec<String>) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value >= 0.0 => value,
        _ => {
            warnings.push(format!(
                "argument {raw} to option '-{opt}' is invalid, using default: {default:.1}"
            ));
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn settings(args: &[&str]) -> Settings {
        let argv = std::iter::once("pipeplay").chain(args.iter().copied());
        Args::try_parse_from(argv).unwrap().into_settings()
    }

    #[test]
    fn no_arguments_gives_defaults() {
        let s = settings(&[]);
        assert_eq!(s.config, PlayerConfig::default());
        assert_eq!(s.verbosity, 1);
        assert!(s.warnings.is_empty());
    }

    #[test]
    fn parses_every_option() {
        let s = settings(&[
            "-c", "2", "-f", "s16", "-r", "44100", "-b", "256", "-d", "clipping", "-t", "1.5",
            "-v", "3",
        ]);
        assert_eq!(s.config.channels, 2);
        assert_eq!(s.config.sample_format, SampleFormat::S16);
        assert_eq!(s.config.sample_rate, 44_100.0);
        assert_eq!(s.config.frames_per_buffer, 256);
        assert!(s.config.stream_flags.clip_off);
        assert!(!s.config.stream_flags.dither_off);
        assert_eq!(s.config.idle_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(s.verbosity, 3);
        assert!(s.warnings.is_empty());
    }

    #[test]
    fn negative_rate_falls_back_with_warning() {
        let s = settings(&["-r", "-5"]);
        assert_eq!(s.config.sample_rate, 22_256.0);
        assert_eq!(
            s.warnings,
            vec!["argument -5 to option '-r' is invalid, using default: 22256.0"]
        );
    }

    #[test]
    fn negative_integers_fall_back_with_warning() {
        let s = settings(&["-c", "-2", "-b", "-1"]);
        assert_eq!(s.config.channels, 1);
        assert_eq!(s.config.frames_per_buffer, 370);
        assert_eq!(s.warnings.len(), 2);
        assert!(s.warnings[1].contains("using default: 370"));
    }

    #[test]
    fn oversized_integers_saturate() {
        let s = settings(&["-v", "300", "-c", "70000"]);
        assert_eq!(s.verbosity, u8::MAX);
        assert_eq!(s.config.channels, u16::MAX);
        assert!(s.warnings.is_empty());
    }

    #[test]
    fn non_numeric_integer_falls_back_with_warning() {
        let s = settings(&["-v", "loud"]);
        assert_eq!(s.verbosity, 1);
        assert_eq!(
            s.warnings,
            vec!["argument loud to option '-v' is invalid, using default: 1"]
        );
    }

    #[test]
    fn negative_timeout_means_forever() {
        let s = settings(&["-t", "-1"]);
        assert_eq!(s.config.idle_timeout, None);
        assert_eq!(s.warnings.len(), 1);
    }

    #[test]
    fn zero_timeout_is_kept() {
        let s = settings(&["-t", "0"]);
        assert_eq!(s.config.idle_timeout, Some(Duration::ZERO));
    }

    #[test]
    fn unknown_format_keeps_default() {
        let s = settings(&["-f", "s12"]);
        assert_eq!(s.config.sample_format, SampleFormat::U8);
        assert_eq!(
            s.warnings,
            vec!["argument s12 to option '-f' is invalid, using default: u8"]
        );
    }

    #[test]
    fn float_format_accepts_short_name() {
        assert_eq!(settings(&["-f", "f"]).config.sample_format, SampleFormat::F32);
    }

    #[test]
    fn disable_is_repeatable_and_skips_unknown() {
        let s = settings(&["-d", "clipping", "-d", "reverb", "-d", "dithering"]);
        assert!(s.config.stream_flags.clip_off);
        assert!(s.config.stream_flags.dither_off);
        assert_eq!(s.warnings, vec!["argument reverb to option '-d' is invalid"]);
    }

    #[test]
    fn help_is_reported_to_caller() {
        let err = Args::try_parse_from(["pipeplay", "-h"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn unknown_flag_is_an_error() {
        let err = Args::try_parse_from(["pipeplay", "-x"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn missing_argument_is_an_error() {
        assert!(Args::try_parse_from(["pipeplay", "-c"]).is_err());
    }
}
