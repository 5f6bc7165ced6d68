//! Controller configuration and mapping persistence.
//!
//! The on-disk format is JSON with omit-when-default keys so hand-edited
//! files stay small and a saved file reproduces a loaded one.
//! [`MappingConfig`] is the persisted form of a runtime
//! [`MappingEntry`](crate::mapping::MappingEntry); building entries resolves
//! target paths through a [`ParamProvider`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::mapping::{BehaviorMode, FeedbackControl, MappingEntry, MessageKind};
use crate::param::{BindingTarget, ParamProvider};

/// Root configuration: device and behavior settings plus the mapping list.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Input port name substring (case-insensitive match).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_in: String,
    /// Output port name substring for feedback.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_out: String,
    #[serde(default = "default_out_channel")]
    pub out_channel: u8,
    #[serde(default = "default_velocity_mult")]
    pub velocity_mult: f32,
    #[serde(default)]
    pub use_channel_as_voice: bool,
    #[serde(default)]
    pub note_offset: i32,
    #[serde(default = "default_pitch_bend_range")]
    pub pitch_bend_range: f32,
    /// Which CC drives mod-wheel modulation; convention allows 1 or 74.
    #[serde(default = "default_mod_wheel_cc")]
    pub mod_wheel_cc: u8,
    /// When set, SetValue mappings also fire on release.
    #[serde(default)]
    pub negative_edge: bool,
    /// When set, manually added slider mappings start incremental.
    #[serde(default)]
    pub incremental_sliders: bool,
    #[serde(default = "default_true")]
    pub two_way: bool,
    #[serde(default)]
    pub print_input: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<MappingConfig>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            device_in: String::new(),
            device_out: String::new(),
            out_channel: default_out_channel(),
            velocity_mult: default_velocity_mult(),
            use_channel_as_voice: false,
            note_offset: 0,
            pitch_bend_range: default_pitch_bend_range(),
            mod_wheel_cc: default_mod_wheel_cc(),
            negative_edge: false,
            incremental_sliders: false,
            two_way: default_true(),
            print_input: false,
            connections: Vec::new(),
        }
    }
}

/// One persisted mapping. Key spelling follows the established file format;
/// every default is omitted on save.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MappingConfig {
    pub control: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uicontrol: Option<String>,
    #[serde(rename = "type", default)]
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i32>,
    /// Present exactly for the SetValue family.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub toggle: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub direct: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub release: bool,
    #[serde(default, skip_serializing_if = "is_zero_i32")]
    pub midi_off_value: i32,
    #[serde(default = "default_on_value", skip_serializing_if = "is_127")]
    pub midi_on_value: i32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub blink: bool,
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    pub increment_amount: f32,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub twoway: bool,
    #[serde(default = "default_feedback", skip_serializing_if = "is_neg_one")]
    pub feedbackcontrol: i32,
    /// Load-only: duplicate this mapping onto the following pages, one
    /// target path per page. Saves write the duplicates independently.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<String>,
}

impl ControllerConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: ControllerConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse JSON config: {}", path))?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;

        fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.out_channel == 0 || self.out_channel > 16 {
            anyhow::bail!("out_channel {} is invalid (must be 1-16)", self.out_channel);
        }
        if self.mod_wheel_cc != 1 && self.mod_wheel_cc != 74 {
            anyhow::bail!(
                "mod_wheel_cc {} is invalid (must be 1 or 74)",
                self.mod_wheel_cc
            );
        }
        if self.pitch_bend_range <= 0.0 {
            anyhow::bail!(
                "pitch_bend_range {} is invalid (must be positive)",
                self.pitch_bend_range
            );
        }
        Ok(())
    }
}

impl MappingConfig {
    /// The persisted form of a runtime entry.
    pub fn from_entry(entry: &MappingEntry) -> Self {
        let value_modes = matches!(
            entry.mode,
            BehaviorMode::SetValue | BehaviorMode::SetValueOnRelease
        );
        Self {
            control: entry.control as i64,
            uicontrol: entry.target.spec(),
            message_type: entry.kind.as_str().to_string(),
            channel: entry.channel.map(|c| c as i32),
            page: entry.page.map(|p| p as i32),
            value: value_modes.then_some(entry.fixed_value),
            toggle: entry.mode == BehaviorMode::Toggle,
            direct: entry.mode == BehaviorMode::Direct,
            release: entry.mode == BehaviorMode::SetValueOnRelease,
            midi_off_value: entry.midi_off_value,
            midi_on_value: entry.midi_on_value,
            blink: entry.blink,
            increment_amount: entry.increment,
            twoway: entry.two_way,
            feedbackcontrol: entry.feedback.as_raw(),
            pages: Vec::new(),
        }
    }

    /// Build the runtime entry, plus a duplicate per `pages` path that
    /// resolves. Target paths that do not resolve load as inert entries
    /// rather than failing the file.
    pub fn build_entries(&self, params: &dyn ParamProvider) -> Vec<MappingEntry> {
        let kind = MessageKind::from_name(&self.message_type).unwrap_or_else(|| {
            if !self.message_type.is_empty() {
                warn!(
                    message_type = %self.message_type,
                    "unknown mapping type, falling back to control change"
                );
            }
            MessageKind::ControlChange
        });

        let control = self.control.rem_euclid(128) as u8;

        let channel = match self.channel {
            None | Some(-1) => None,
            Some(c) if (0..=16).contains(&c) => Some(c as u8),
            Some(c) => {
                warn!(channel = c, "channel out of range, matching any channel");
                None
            }
        };

        let page = match self.page {
            None | Some(-1) => None,
            Some(p) if p >= 0 => Some(p as usize),
            Some(p) => {
                warn!(page = p, "negative page, treating as pageless");
                None
            }
        };

        let mut target = self
            .uicontrol
            .as_deref()
            .map(BindingTarget::from_spec)
            .unwrap_or_else(BindingTarget::none);
        if let BindingTarget::Unbound { path: Some(path) } = &target {
            if let Some(handle) = params.find(path) {
                target = BindingTarget::Control(handle);
            }
        }

        let mode = if self.toggle {
            BehaviorMode::Toggle
        } else if self.direct {
            BehaviorMode::Direct
        } else if self.value.is_none() {
            BehaviorMode::Slider
        } else if self.release {
            BehaviorMode::SetValueOnRelease
        } else {
            BehaviorMode::SetValue
        };

        let mut entry = MappingEntry::new(kind, control, channel, page, target);
        entry.mode = mode;
        entry.fixed_value = self.value.unwrap_or(0.0);
        entry.increment = self.increment_amount;
        entry.midi_on_value = self.midi_on_value;
        entry.midi_off_value = self.midi_off_value;
        entry.blink = self.blink;
        entry.two_way = self.twoway;
        entry.feedback = FeedbackControl::from_raw(self.feedbackcontrol);

        let mut entries = vec![entry];
        for (i, path) in self.pages.iter().enumerate() {
            if let Some(handle) = params.find(path) {
                let mut dup = entries[0].clone();
                dup.page = entries[0].page.map(|p| p + i + 1);
                dup.target = BindingTarget::Control(handle);
                entries.push(dup);
            }
        }
        entries
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_out_channel() -> u8 { 1 }
fn default_velocity_mult() -> f32 { 1.0 }
fn default_pitch_bend_range() -> f32 { 2.0 }
fn default_mod_wheel_cc() -> u8 { 1 }
fn default_on_value() -> i32 { 127 }
fn default_feedback() -> i32 { -1 }

// skip_serializing_if predicates
fn is_true(v: &bool) -> bool { *v }
fn is_false(v: &bool) -> bool { !*v }
fn is_zero_i32(v: &i32) -> bool { *v == 0 }
fn is_zero_f32(v: &f32) -> bool { *v == 0.0 }
fn is_127(v: &i32) -> bool { *v == 127 }
fn is_neg_one(v: &i32) -> bool { *v == -1 }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::{FloatParam, ParamRegistry};
    use serde_json::json;

    fn registry_with(paths: &[&str]) -> ParamRegistry {
        let registry = ParamRegistry::new();
        for path in paths {
            registry.register(FloatParam::new(*path, 0.0, 1.0, 0.0));
        }
        registry
    }

    #[test]
    fn test_mode_inference_precedence() {
        let registry = registry_with(&["a"]);
        let base = json!({ "control": 7, "uicontrol": "a", "type": "control" });

        let cases = [
            (json!({}), BehaviorMode::Slider),
            (json!({ "toggle": true, "value": 1.0 }), BehaviorMode::Toggle),
            (json!({ "direct": true, "value": 1.0 }), BehaviorMode::Direct),
            (json!({ "value": 0.5 }), BehaviorMode::SetValue),
            (
                json!({ "value": 0.5, "release": true }),
                BehaviorMode::SetValueOnRelease,
            ),
        ];

        for (extra, expected) in cases {
            let mut merged = base.as_object().unwrap().clone();
            merged.extend(extra.as_object().unwrap().clone());
            let config: MappingConfig =
                serde_json::from_value(serde_json::Value::Object(merged)).unwrap();
            let entries = config.build_entries(&registry);
            assert_eq!(entries[0].mode, expected, "for extra {:?}", extra);
        }
    }

    #[test]
    fn test_load_defaults() {
        let registry = registry_with(&[]);
        let config: MappingConfig =
            serde_json::from_value(json!({ "control": 12, "type": "note" })).unwrap();
        let entry = &config.build_entries(&registry)[0];

        assert_eq!(entry.kind, MessageKind::Note);
        assert_eq!(entry.control, 12);
        assert_eq!(entry.channel, None);
        assert_eq!(entry.page, None);
        assert_eq!(entry.midi_on_value, 127);
        assert_eq!(entry.midi_off_value, 0);
        assert!(entry.two_way);
        assert_eq!(entry.feedback, FeedbackControl::Same);
    }

    #[test]
    fn test_unknown_type_falls_back_to_control() {
        let registry = registry_with(&[]);
        let config: MappingConfig =
            serde_json::from_value(json!({ "control": 3, "type": "sysex" })).unwrap();
        let entry = &config.build_entries(&registry)[0];
        assert_eq!(entry.kind, MessageKind::ControlChange);
    }

    #[test]
    fn test_control_normalized_mod_128() {
        let registry = registry_with(&[]);
        let config: MappingConfig =
            serde_json::from_value(json!({ "control": 135, "type": "control" })).unwrap();
        assert_eq!(config.build_entries(&registry)[0].control, 7);
    }

    #[test]
    fn test_out_of_range_channel_matches_any() {
        let registry = registry_with(&[]);
        let config: MappingConfig =
            serde_json::from_value(json!({ "control": 1, "type": "control", "channel": 42 }))
                .unwrap();
        assert_eq!(config.build_entries(&registry)[0].channel, None);
    }

    #[test]
    fn test_pitchbend_pins_control() {
        let registry = registry_with(&[]);
        let config: MappingConfig =
            serde_json::from_value(json!({ "control": 99, "type": "pitchbend" })).unwrap();
        let entry = &config.build_entries(&registry)[0];
        assert_eq!(entry.kind, MessageKind::PitchBend);
        assert_eq!(entry.control, 0);
    }

    #[test]
    fn test_pages_duplication() {
        let registry = registry_with(&["deck1/vol", "deck2/vol", "deck3/vol"]);
        let config: MappingConfig = serde_json::from_value(json!({
            "control": 7,
            "type": "control",
            "uicontrol": "deck1/vol",
            "page": 0,
            "pages": ["deck2/vol", "deck3/vol"],
        }))
        .unwrap();

        let entries = config.build_entries(&registry);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].page, Some(0));
        assert_eq!(entries[1].page, Some(1));
        assert_eq!(entries[2].page, Some(2));
        assert_eq!(entries[1].target.spec().as_deref(), Some("deck2/vol"));
    }

    #[test]
    fn test_pages_duplication_skips_unresolved() {
        let registry = registry_with(&["deck1/vol"]);
        let config: MappingConfig = serde_json::from_value(json!({
            "control": 7,
            "type": "control",
            "uicontrol": "deck1/vol",
            "page": 0,
            "pages": ["missing/vol"],
        }))
        .unwrap();
        assert_eq!(config.build_entries(&registry).len(), 1);
    }

    #[test]
    fn test_save_omits_defaults() {
        let registry = registry_with(&["a"]);
        let config: MappingConfig =
            serde_json::from_value(json!({ "control": 7, "uicontrol": "a", "type": "control" }))
                .unwrap();
        let entry = &config.build_entries(&registry)[0];

        let saved = serde_json::to_value(MappingConfig::from_entry(entry)).unwrap();
        let keys: Vec<&str> = saved
            .as_object()
            .unwrap()
            .keys()
            .map(|k| k.as_str())
            .collect();
        assert_eq!(keys.len(), 3, "unexpected keys: {:?}", keys);
        assert!(keys.contains(&"control"));
        assert!(keys.contains(&"uicontrol"));
        assert!(keys.contains(&"type"));
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let registry = registry_with(&["a"]);
        let original: MappingConfig = serde_json::from_value(json!({
            "control": 20,
            "uicontrol": "a",
            "type": "note",
            "channel": 3,
            "page": 1,
            "value": 0.75,
            "release": true,
            "midi_on_value": 100,
            "midi_off_value": 5,
            "blink": true,
            "twoway": false,
            "feedbackcontrol": 21,
        }))
        .unwrap();

        let entry = &original.build_entries(&registry)[0];
        let saved = MappingConfig::from_entry(entry);
        assert_eq!(saved, original);
    }

    #[test]
    fn test_hover_and_hotbind_round_trip() {
        let registry = registry_with(&[]);
        for spec in ["hover", "hotbind4"] {
            let config: MappingConfig = serde_json::from_value(
                json!({ "control": 1, "type": "control", "uicontrol": spec }),
            )
            .unwrap();
            let entry = &config.build_entries(&registry)[0];
            let saved = MappingConfig::from_entry(entry);
            assert_eq!(saved.uicontrol.as_deref(), Some(spec));
        }
    }

    #[test]
    fn test_unresolved_path_round_trips() {
        let registry = registry_with(&[]);
        let config: MappingConfig = serde_json::from_value(
            json!({ "control": 1, "type": "control", "uicontrol": "gone/param" }),
        )
        .unwrap();
        let entry = &config.build_entries(&registry)[0];
        assert!(entry.target.resolve(&registry).is_none());
        assert_eq!(
            MappingConfig::from_entry(entry).uicontrol.as_deref(),
            Some("gone/param")
        );
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = ControllerConfig::default();
        assert!(config.validate().is_ok());

        config.out_channel = 17;
        assert!(config.validate().is_err());

        config.out_channel = 1;
        config.mod_wheel_cc = 2;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.json");
        let path = path.to_str().unwrap();

        let mut config = ControllerConfig::default();
        config.device_in = "nanoKONTROL".to_string();
        config.connections.push(
            serde_json::from_value(json!({
                "control": 7,
                "type": "control",
                "uicontrol": "synth/cutoff",
            }))
            .unwrap(),
        );

        config.save(path).await.unwrap();
        let loaded = ControllerConfig::load(path).await.unwrap();

        assert_eq!(loaded.device_in, "nanoKONTROL");
        assert_eq!(loaded.connections, config.connections);
        assert!(loaded.two_way);
    }
}
