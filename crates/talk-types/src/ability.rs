//! Ability snapshot: which providers are usable and what they can be tuned with.
//!
//! Clients use the snapshot to drive UI options. The JSON shape nests each
//! provider under its capability:
//!
//! ```json
//! {"llm": {"available": true, "chatGPT": {"available": true, "models": ["gpt-4"]}}}
//! ```

use crate::CapabilityKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate description of every capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ability {
    pub llm: CapabilityAbility,
    pub stt: CapabilityAbility,
    pub tts: CapabilityAbility,
}

impl Ability {
    pub fn capability(&self, kind: CapabilityKind) -> &CapabilityAbility {
        match kind {
            CapabilityKind::Llm => &self.llm,
            CapabilityKind::Stt => &self.stt,
            CapabilityKind::Tts => &self.tts,
        }
    }

    pub fn capability_mut(&mut self, kind: CapabilityKind) -> &mut CapabilityAbility {
        match kind {
            CapabilityKind::Llm => &mut self.llm,
            CapabilityKind::Stt => &mut self.stt,
            CapabilityKind::Tts => &mut self.tts,
        }
    }

    /// Records one provider's description and marks its capability available.
    pub fn insert(&mut self, kind: CapabilityKind, provider: &str, ability: ProviderAbility) {
        let capability = self.capability_mut(kind);
        if ability.available {
            capability.available = true;
        }
        capability.providers.insert(provider.to_string(), ability);
    }

    /// Returns `true` if any capability has at least one usable provider.
    pub fn any_available(&self) -> bool {
        self.llm.available || self.stt.available || self.tts.available
    }
}

/// Availability of one capability and the providers behind it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityAbility {
    pub available: bool,
    #[serde(flatten)]
    pub providers: BTreeMap<String, ProviderAbility>,
}

/// What a single provider reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderAbility {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub voices: Vec<TaggedItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<TaggedItem>,
}

impl ProviderAbility {
    pub fn available() -> Self {
        Self {
            available: true,
            ..Self::default()
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    pub fn with_voices(mut self, voices: Vec<TaggedItem>) -> Self {
        self.voices = voices;
        self
    }
}

/// A selectable item (voice, language) with display name and `key=value` tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedItem {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}
