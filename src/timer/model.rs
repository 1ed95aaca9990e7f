use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::StoreError;

/// Fire time recorded for timers that wait on the playback layer instead of
/// the wall clock.
pub const END_OF_CONTENT_SENTINEL_MS: i64 = i64::MAX;
pub const MS_PER_MINUTE: i64 = 60_000;

const RECORD_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum TimerMode {
    FixedDuration { minutes: u32 },
    EndOfContent,
}

impl TimerMode {
    pub fn fixed(minutes: u32) -> Self {
        TimerMode::FixedDuration { minutes }
    }

    /// Wall-clock fire time for a timer armed at `armed_at_epoch_ms`.
    pub fn fire_at_epoch_ms(&self, armed_at_epoch_ms: i64) -> i64 {
        match self {
            TimerMode::FixedDuration { minutes } => armed_at_epoch_ms
                .saturating_add(i64::from(*minutes) * MS_PER_MINUTE)
                .min(END_OF_CONTENT_SENTINEL_MS - 1),
            TimerMode::EndOfContent => END_OF_CONTENT_SENTINEL_MS,
        }
    }

    pub fn minutes(&self) -> Option<u32> {
        match self {
            TimerMode::FixedDuration { minutes } => Some(*minutes),
            TimerMode::EndOfContent => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            TimerMode::FixedDuration { .. } => "fixed_duration",
            TimerMode::EndOfContent => "end_of_content",
        }
    }
}

impl fmt::Display for TimerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerMode::FixedDuration { minutes } => write!(f, "{minutes} min"),
            TimerMode::EndOfContent => f.write_str("end of content"),
        }
    }
}

pub const PRESET_MODES: [TimerMode; 8] = [
    TimerMode::FixedDuration { minutes: 5 },
    TimerMode::FixedDuration { minutes: 10 },
    TimerMode::FixedDuration { minutes: 15 },
    TimerMode::FixedDuration { minutes: 30 },
    TimerMode::FixedDuration { minutes: 45 },
    TimerMode::FixedDuration { minutes: 60 },
    TimerMode::FixedDuration { minutes: 90 },
    TimerMode::EndOfContent,
];

pub fn preset(index: usize) -> Option<TimerMode> {
    PRESET_MODES.get(index).copied()
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Token(value.into())
    }

    pub fn generate() -> Self {
        Token(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Token::new(value)
    }
}

/// The one armed timer. A loaded value always describes a live timer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ScheduledTimer {
    pub mode: TimerMode,
    pub armed_at_epoch_ms: i64,
    pub fire_at_epoch_ms: i64,
    pub token: Token,
}

impl ScheduledTimer {
    pub fn new(mode: TimerMode, armed_at_epoch_ms: i64, token: Token) -> Self {
        Self {
            mode,
            armed_at_epoch_ms,
            fire_at_epoch_ms: mode.fire_at_epoch_ms(armed_at_epoch_ms),
            token,
        }
    }

    pub fn is_end_of_content(&self) -> bool {
        matches!(self.mode, TimerMode::EndOfContent)
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct TimerConfiguration {
    pub last_mode: Option<TimerMode>,
    pub preset_index: Option<usize>,
}

impl TimerConfiguration {
    pub fn from_mode(mode: TimerMode) -> Self {
        Self {
            last_mode: Some(mode),
            preset_index: PRESET_MODES.iter().position(|candidate| *candidate == mode),
        }
    }
}

pub fn encode_scheduled_timer(timer: &ScheduledTimer) -> Result<String, StoreError> {
    let file = TimerRecordFile {
        version: RECORD_VERSION,
        is_active: true,
        mode: ModeTag::from_mode(&timer.mode),
        minutes: timer.mode.minutes(),
        armed_at_epoch_ms: timer.armed_at_epoch_ms,
        fire_at_epoch_ms: timer.fire_at_epoch_ms,
        token: timer.token.as_str().to_string(),
    };
    Ok(serde_json::to_string(&file)?)
}

/// Decodes a persisted timer record. Inactive records decode to `None`.
pub fn parse_scheduled_timer_text(
    key: &str,
    content: &str,
) -> Result<Option<ScheduledTimer>, StoreError> {
    let raw = serde_json::from_str::<TimerRecordFile>(content)
        .map_err(|err| StoreError::invalid_json(&err))?;
    let corrupt = |reason: String| StoreError::Corrupt {
        key: key.to_string(),
        reason,
    };

    if raw.version != RECORD_VERSION {
        return Err(corrupt(format!(
            "unsupported timer record version {}; expected version {RECORD_VERSION}",
            raw.version
        )));
    }
    if !raw.is_active {
        return Ok(None);
    }
    if raw.token.trim().is_empty() {
        return Err(corrupt("active timer record has an empty token".to_string()));
    }

    let mode = raw
        .mode
        .to_mode(raw.minutes)
        .map_err(|reason| corrupt(reason.to_string()))?;
    let expected_fire_at = mode.fire_at_epoch_ms(raw.armed_at_epoch_ms);
    if raw.fire_at_epoch_ms != expected_fire_at {
        return Err(corrupt(format!(
            "fire_at_epoch_ms {} does not match {mode} armed at {}",
            raw.fire_at_epoch_ms, raw.armed_at_epoch_ms
        )));
    }

    Ok(Some(ScheduledTimer {
        mode,
        armed_at_epoch_ms: raw.armed_at_epoch_ms,
        fire_at_epoch_ms: raw.fire_at_epoch_ms,
        token: Token(raw.token),
    }))
}

pub fn encode_configuration(configuration: &TimerConfiguration) -> Result<String, StoreError> {
    let file = ConfigurationFile {
        version: RECORD_VERSION,
        mode: configuration.last_mode.as_ref().map(ModeTag::from_mode),
        minutes: configuration.last_mode.and_then(|mode| mode.minutes()),
        preset_index: configuration.preset_index,
    };
    Ok(serde_json::to_string(&file)?)
}

pub fn parse_configuration_text(
    key: &str,
    content: &str,
) -> Result<TimerConfiguration, StoreError> {
    let raw = serde_json::from_str::<ConfigurationFile>(content)
        .map_err(|err| StoreError::invalid_json(&err))?;
    let corrupt = |reason: String| StoreError::Corrupt {
        key: key.to_string(),
        reason,
    };
    if raw.version != RECORD_VERSION {
        return Err(corrupt(format!(
            "unsupported configuration version {}; expected version {RECORD_VERSION}",
            raw.version
        )));
    }

    let last_mode = raw
        .mode
        .map(|tag| tag.to_mode(raw.minutes))
        .transpose()
        .map_err(|reason| corrupt(reason.to_string()))?;
    let preset_index = raw
        .preset_index
        .filter(|index| *index < PRESET_MODES.len());

    Ok(TimerConfiguration {
        last_mode,
        preset_index,
    })
}

#[derive(Debug, Deserialize, Serialize)]
struct TimerRecordFile {
    version: u32,
    is_active: bool,
    mode: ModeTag,
    #[serde(default)]
    minutes: Option<u32>,
    armed_at_epoch_ms: i64,
    fire_at_epoch_ms: i64,
    token: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct ConfigurationFile {
    version: u32,
    #[serde(default)]
    mode: Option<ModeTag>,
    #[serde(default)]
    minutes: Option<u32>,
    #[serde(default)]
    preset_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
enum ModeTag {
    FixedDuration,
    EndOfContent,
}

impl ModeTag {
    fn from_mode(mode: &TimerMode) -> Self {
        match mode {
            TimerMode::FixedDuration { .. } => ModeTag::FixedDuration,
            TimerMode::EndOfContent => ModeTag::EndOfContent,
        }
    }

    fn to_mode(self, minutes: Option<u32>) -> Result<TimerMode, &'static str> {
        match (self, minutes) {
            (ModeTag::FixedDuration, Some(minutes)) if minutes > 0 => {
                Ok(TimerMode::FixedDuration { minutes })
            }
            (ModeTag::FixedDuration, _) => Err("fixed_duration requires minutes > 0"),
            (ModeTag::EndOfContent, None) => Ok(TimerMode::EndOfContent),
            (ModeTag::EndOfContent, Some(_)) => Err("end_of_content must not carry minutes"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_duration_fire_time_is_minutes_after_arming() {
        for minutes in [1_u32, 5, 45, 1_440] {
            let mode = TimerMode::fixed(minutes);
            assert_eq!(
                mode.fire_at_epoch_ms(1_000),
                1_000 + i64::from(minutes) * 60_000
            );
        }
        assert_eq!(
            TimerMode::EndOfContent.fire_at_epoch_ms(1_000),
            END_OF_CONTENT_SENTINEL_MS
        );
    }

    #[test]
    fn fixed_duration_never_reaches_sentinel() {
        let mode = TimerMode::fixed(u32::MAX);
        assert!(mode.fire_at_epoch_ms(i64::MAX - 5) < END_OF_CONTENT_SENTINEL_MS);
    }

    #[test]
    fn parses_active_fixed_record() {
        let json = r#"
{
  "version": 1,
  "is_active": true,
  "mode": "fixed_duration",
  "minutes": 15,
  "armed_at_epoch_ms": 1000,
  "fire_at_epoch_ms": 901000,
  "token": "abc"
}
"#;
        let timer = parse_scheduled_timer_text("k", json)
            .expect("valid record")
            .expect("active record");
        assert_eq!(timer.mode, TimerMode::fixed(15));
        assert_eq!(timer.token, Token::from("abc"));
        assert_eq!(timer.fire_at_epoch_ms, 901_000);
    }

    #[test]
    fn inactive_record_reads_as_absent() {
        let json = r#"{"version":1,"is_active":false,"mode":"end_of_content",
            "armed_at_epoch_ms":0,"fire_at_epoch_ms":0,"token":""}"#;
        assert!(
            parse_scheduled_timer_text("k", json)
                .expect("valid record")
                .is_none()
        );
    }

    #[test]
    fn end_of_content_record_keeps_sentinel() {
        let timer = ScheduledTimer::new(TimerMode::EndOfContent, 77, Token::from("eoc"));
        let text = encode_scheduled_timer(&timer).expect("encode");
        assert!(text.contains("\"end_of_content\""));

        let decoded = parse_scheduled_timer_text("k", &text)
            .expect("decode")
            .expect("active");
        assert_eq!(decoded, timer);
        assert!(decoded.is_end_of_content());
    }

    #[test]
    fn rejects_fixed_record_without_minutes() {
        let json = r#"{"version":1,"is_active":true,"mode":"fixed_duration",
            "armed_at_epoch_ms":0,"fire_at_epoch_ms":0,"token":"t"}"#;
        let err = parse_scheduled_timer_text("sleep_timer.scheduled", json)
            .expect_err("missing minutes should fail");
        assert!(err.to_string().contains("requires minutes > 0"));
        assert!(err.to_string().contains("sleep_timer.scheduled"));
    }

    #[test]
    fn rejects_mismatched_fire_time() {
        let json = r#"{"version":1,"is_active":true,"mode":"fixed_duration","minutes":5,
            "armed_at_epoch_ms":0,"fire_at_epoch_ms":1,"token":"t"}"#;
        let err = parse_scheduled_timer_text("k", json).expect_err("mismatch should fail");
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn rejects_unknown_mode_tag() {
        let json = r#"{"version":1,"is_active":true,"mode":"recurring",
            "armed_at_epoch_ms":0,"fire_at_epoch_ms":0,"token":"t"}"#;
        let err = parse_scheduled_timer_text("k", json).expect_err("unknown mode");
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn rejects_future_record_version() {
        let json = r#"{"version":2,"is_active":true,"mode":"end_of_content",
            "armed_at_epoch_ms":0,"fire_at_epoch_ms":0,"token":"t"}"#;
        let err = parse_scheduled_timer_text("k", json).expect_err("version 2");
        assert!(err.to_string().contains("unsupported timer record version 2"));
    }

    #[test]
    fn configuration_tracks_preset_position() {
        let config = TimerConfiguration::from_mode(TimerMode::fixed(30));
        assert_eq!(config.preset_index, Some(3));

        let custom = TimerConfiguration::from_mode(TimerMode::fixed(7));
        assert_eq!(custom.preset_index, None);

        let text = encode_configuration(&config).expect("encode");
        let decoded = parse_configuration_text("c", &text).expect("decode");
        assert_eq!(decoded, config);
    }

    #[test]
    fn configuration_drops_out_of_range_preset() {
        let json = r#"{"version":1,"mode":"end_of_content","preset_index":99}"#;
        let config = parse_configuration_text("c", json).expect("decode");
        assert_eq!(config.last_mode, Some(TimerMode::EndOfContent));
        assert_eq!(config.preset_index, None);
    }

    #[test]
    fn generated_tokens_are_unique() {
        let first = Token::generate();
        let second = Token::generate();
        assert_ne!(first, second);
        assert_eq!(first.as_str().len(), 36);
    }

    #[test]
    fn presets_end_with_end_of_content() {
        assert_eq!(preset(0), Some(TimerMode::fixed(5)));
        assert_eq!(preset(PRESET_MODES.len() - 1), Some(TimerMode::EndOfContent));
        assert_eq!(preset(PRESET_MODES.len()), None);
    }
}
