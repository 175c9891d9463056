//! Transcode profile selection.
//!
//! A profile is the argument list handed to the transcoder, minus the
//! program itself. Exactly one token is the [`INPUT_PLACEHOLDER`], which is
//! replaced by the upstream URL at launch. Substitution is per token and the
//! vector is passed straight to the process, so no shell ever sees the URL.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use log::{debug, warn};
use serde::Serialize;

use crate::stream::transcoder::Invocation;

/// Token replaced by the upstream URL.
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Name of the built-in software profile.
pub const SOFTWARE: &str = "software";

/// Name of the built-in hardware-accelerated profile.
pub const HARDWARE_ACCELERATED: &str = "hardware";

/// User agent presented to IPTV providers; several reject ffmpeg's default.
const USER_AGENT: &str = "VLC/3.0.20-git LibVLC/3.0.20-git";

/// Error type for profile registration and lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    /// No profile with this name is registered.
    #[error("Unknown transcode profile: {0}")]
    UnknownProfile(String),

    /// The input placeholder is missing or repeated.
    #[error("Profile '{name}' must contain the {INPUT_PLACEHOLDER} token exactly once (found {count})")]
    Placeholder { name: String, count: usize },

    /// Built-in names cannot be redefined.
    #[error("Profile name '{0}' is reserved")]
    ReservedName(String),

    /// Profile names must be non-empty.
    #[error("Profile name must not be empty")]
    EmptyName,
}

/// A transcode profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Profile {
    /// Copy video, re-encode audio to AAC, mux MPEG-TS to stdout.
    Software,
    /// VAAPI decode/encode with a quality target and capped bitrate.
    HardwareAccelerated,
    /// Operator-supplied tokens, validated at registration.
    Custom { name: String, args: Vec<String> },
}

impl Profile {
    /// Validate and build a user-defined profile.
    pub fn custom(name: &str, args: Vec<String>) -> Result<Self, ProfileError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ProfileError::EmptyName);
        }
        if name == SOFTWARE || name == HARDWARE_ACCELERATED {
            return Err(ProfileError::ReservedName(name.to_string()));
        }

        let count = args.iter().filter(|t| *t == INPUT_PLACEHOLDER).count();
        if count != 1 {
            return Err(ProfileError::Placeholder {
                name: name.to_string(),
                count,
            });
        }

        Ok(Profile::Custom {
            name: name.to_string(),
            args,
        })
    }

    /// Profile name as stored in settings.
    pub fn name(&self) -> &str {
        match self {
            Profile::Software => SOFTWARE,
            Profile::HardwareAccelerated => HARDWARE_ACCELERATED,
            Profile::Custom { name, .. } => name,
        }
    }

    /// Argument template including the placeholder token.
    pub fn template(&self) -> Vec<String> {
        match self {
            Profile::Software => to_tokens(&[
                "-hide_banner", "-loglevel", "error",
                "-user_agent", USER_AGENT,
                "-re", "-i", INPUT_PLACEHOLDER,
                "-max_muxing_queue_size", "1024",
                "-c:v", "copy",
                "-c:a", "aac",
                "-preset", "ultrafast",
                "-f", "mpegts", "pipe:1",
            ]),
            Profile::HardwareAccelerated => to_tokens(&[
                "-hide_banner", "-loglevel", "error",
                "-hwaccel", "vaapi",
                "-hwaccel_device", "/dev/dri/renderD128",
                "-hwaccel_output_format", "vaapi",
                "-user_agent", USER_AGENT,
                "-re", "-i", INPUT_PLACEHOLDER,
                "-max_muxing_queue_size", "1024",
                "-c:v", "h264_vaapi",
                "-rc_mode", "QVBR",
                "-global_quality", "23",
                "-maxrate", "8M",
                "-bufsize", "16M",
                "-c:a", "aac",
                "-f", "mpegts", "pipe:1",
            ]),
            Profile::Custom { args, .. } => args.clone(),
        }
    }

    /// Substitute `input` for the placeholder token.
    pub fn render(&self, input: &str) -> Vec<String> {
        self.template()
            .into_iter()
            .map(|token| {
                if token == INPUT_PLACEHOLDER {
                    input.to_string()
                } else {
                    token
                }
            })
            .collect()
    }
}

fn to_tokens(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| t.to_string()).collect()
}

/// Profile summary for the management API.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileInfo {
    pub name: String,
    pub builtin: bool,
    pub selected: bool,
    pub args: Vec<String>,
}

#[derive(Debug)]
struct ProfileState {
    selected: String,
    custom: BTreeMap<String, Profile>,
}

/// Registry of built-in and custom profiles plus the operator's selection.
///
/// The selection can change at runtime; it is read again for every new
/// stream session.
#[derive(Debug)]
pub struct ProfileRegistry {
    /// Transcoder executable.
    program: String,
    state: RwLock<ProfileState>,
}

impl ProfileRegistry {
    /// Create a registry launching `program`, with the software profile selected.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            state: RwLock::new(ProfileState {
                selected: SOFTWARE.to_string(),
                custom: BTreeMap::new(),
            }),
        }
    }

    /// Register (or replace) a custom profile.
    pub fn register(&self, name: &str, args: Vec<String>) -> Result<(), ProfileError> {
        let profile = Profile::custom(name, args)?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        debug!("Registered transcode profile '{}'", profile.name());
        state.custom.insert(profile.name().to_string(), profile);
        Ok(())
    }

    /// Remove a custom profile. Built-ins cannot be removed.
    pub fn remove(&self, name: &str) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.custom.remove(name).is_some()
    }

    /// Look up a profile by name.
    pub fn get(&self, name: &str) -> Option<Profile> {
        match name {
            SOFTWARE => Some(Profile::Software),
            HARDWARE_ACCELERATED => Some(Profile::HardwareAccelerated),
            _ => {
                let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
                state.custom.get(name).cloned()
            }
        }
    }

    /// Select the profile used for new sessions.
    pub fn select(&self, name: &str) -> Result<(), ProfileError> {
        if self.get(name).is_none() {
            return Err(ProfileError::UnknownProfile(name.to_string()));
        }
        self.state.write().unwrap_or_else(PoisonError::into_inner).selected = name.to_string();
        Ok(())
    }

    /// Store a selection without checking it.
    ///
    /// Used when loading persisted settings, where the named profile may have
    /// been deleted since; resolution falls back to software in that case.
    pub fn set_selected_unchecked(&self, name: &str) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).selected = name.to_string();
    }

    /// Currently selected profile name.
    pub fn selected(&self) -> String {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .selected
            .clone()
    }

    /// All profiles, built-ins first.
    pub fn list(&self) -> Vec<ProfileInfo> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        [Profile::Software, Profile::HardwareAccelerated]
            .into_iter()
            .chain(state.custom.values().cloned())
            .map(|p| ProfileInfo {
                name: p.name().to_string(),
                builtin: !matches!(p, Profile::Custom { .. }),
                selected: p.name() == state.selected,
                args: p.template(),
            })
            .collect()
    }

    /// Resolve `name` against `input` into an argument vector.
    pub fn resolve(&self, name: &str, input: &str) -> Result<Vec<String>, ProfileError> {
        self.get(name)
            .map(|p| p.render(input))
            .ok_or_else(|| ProfileError::UnknownProfile(name.to_string()))
    }

    /// Resolve the selected profile, falling back to software if it is gone.
    pub fn resolve_active(&self, input: &str) -> Invocation {
        let selected = self.selected();
        let profile = match self.get(&selected) {
            Some(profile) => profile,
            None => {
                warn!(
                    "{}; falling back to the '{}' profile",
                    ProfileError::UnknownProfile(selected),
                    SOFTWARE
                );
                Profile::Software
            }
        };

        Invocation {
            program: self.program.clone(),
            args: profile.render(input),
            profile: profile.name().to_string(),
        }
    }
}
