//! Color resolution for the piano roll.
//!
//! Three roles (background, normal note, playing note), each configured
//! from a (mode, hex text) pair. Resolution is a pure function: named
//! presets map to fixed constants, custom hex text is parsed, and anything
//! invalid falls back to the role's default with a logged warning — never
//! an error.

use egui::Color32;
use serde::{Deserialize, Serialize};

/// The fixed palette. Presets and per-role fallbacks.
pub struct RollColors;

impl RollColors {
    /// Background preset "green" — also the background fallback.
    pub const GREEN: Color32 = Color32::from_rgb(0x00, 0xFF, 0x00);
    /// Background preset "blue".
    pub const BLUE: Color32 = Color32::from_rgb(0x00, 0x00, 0xFF);
    /// Default and fallback fill for notes at rest.
    pub const NORMAL_NOTE: Color32 = Color32::from_rgb(0x30, 0x30, 0x30);
    /// Default and fallback fill for sounding notes.
    pub const PLAYING_NOTE: Color32 = Color32::from_rgb(0xFF, 0xFF, 0xFF);
}

/// Which of the three configurable colors is being resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorRole {
    Background,
    NormalNote,
    PlayingNote,
}

impl ColorRole {
    /// Fallback color used whenever resolution cannot honor the request.
    pub fn fallback(self) -> Color32 {
        match self {
            ColorRole::Background => RollColors::GREEN,
            ColorRole::NormalNote => RollColors::NORMAL_NOTE,
            ColorRole::PlayingNote => RollColors::PLAYING_NOTE,
        }
    }

    /// The modes this role's selector legitimately offers.
    pub fn modes(self) -> &'static [ColorMode] {
        match self {
            ColorRole::Background => {
                &[ColorMode::Green, ColorMode::Blue, ColorMode::CustomHex]
            }
            ColorRole::NormalNote | ColorRole::PlayingNote => {
                &[ColorMode::Default, ColorMode::CustomHex]
            }
        }
    }

    fn name(self) -> &'static str {
        match self {
            ColorRole::Background => "background",
            ColorRole::NormalNote => "normal note",
            ColorRole::PlayingNote => "playing note",
        }
    }
}

/// How the user asked for a role's color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    /// Named preset, background only.
    Green,
    /// Named preset, background only.
    Blue,
    /// The role's built-in default, note roles only.
    Default,
    /// Parse the accompanying hex text.
    CustomHex,
}

impl ColorMode {
    pub fn label(self) -> &'static str {
        match self {
            ColorMode::Green => "green",
            ColorMode::Blue => "blue",
            ColorMode::Default => "default",
            ColorMode::CustomHex => "hex code",
        }
    }
}

/// Resolve one role's color from the selected mode and hex text.
///
/// Total: invalid hex, empty hex, or a mode the role does not offer all
/// yield the role's fallback plus a `log::warn!` diagnostic.
pub fn resolve(role: ColorRole, mode: ColorMode, hex_text: &str) -> Color32 {
    if !role.modes().contains(&mode) {
        log::warn!(
            "unexpected mode {:?} for {} color, using fallback",
            mode,
            role.name()
        );
        return role.fallback();
    }

    match mode {
        ColorMode::Green => RollColors::GREEN,
        ColorMode::Blue => RollColors::BLUE,
        ColorMode::Default => role.fallback(),
        ColorMode::CustomHex => match parse_hex(hex_text) {
            Some(color) => color,
            None => {
                log::warn!(
                    "invalid hex {:?} for {} color, using fallback",
                    hex_text,
                    role.name()
                );
                role.fallback()
            }
        },
    }
}

/// Parse `RRGGBB` or `AARRGGBB`, with or without a leading `#`.
///
/// Returns `None` for anything else — empty strings, wrong lengths,
/// non-hex digits.
pub fn parse_hex(text: &str) -> Option<Color32> {
    let digits = text.strip_prefix('#').unwrap_or(text);
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    match digits.len() {
        6 => Some(Color32::from_rgb(byte(0)?, byte(2)?, byte(4)?)),
        8 => Some(Color32::from_rgba_unmultiplied(
            byte(2)?,
            byte(4)?,
            byte(6)?,
            byte(0)?,
        )),
        _ => None,
    }
}

/// One role's persisted selection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColorChoice {
    pub mode: ColorMode,
    pub hex: String,
}

impl ColorChoice {
    fn new(mode: ColorMode) -> Self {
        Self { mode, hex: String::new() }
    }
}

/// The three resolved colors, plus the selections that produced them.
///
/// Owned by the settings side of the app; the scene and the bridge read
/// the resolved colors and never write them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColorSettings {
    pub background_choice: ColorChoice,
    pub normal_note_choice: ColorChoice,
    pub playing_note_choice: ColorChoice,
    #[serde(skip, default = "default_background")]
    pub background: Color32,
    #[serde(skip, default = "default_normal")]
    pub normal_note: Color32,
    #[serde(skip, default = "default_playing")]
    pub playing_note: Color32,
}

fn default_background() -> Color32 {
    RollColors::GREEN
}
fn default_normal() -> Color32 {
    RollColors::NORMAL_NOTE
}
fn default_playing() -> Color32 {
    RollColors::PLAYING_NOTE
}

impl Default for ColorSettings {
    fn default() -> Self {
        Self {
            background_choice: ColorChoice::new(ColorMode::Green),
            normal_note_choice: ColorChoice::new(ColorMode::Default),
            playing_note_choice: ColorChoice::new(ColorMode::Default),
            background: RollColors::GREEN,
            normal_note: RollColors::NORMAL_NOTE,
            playing_note: RollColors::PLAYING_NOTE,
        }
    }
}

impl ColorSettings {
    /// Apply a new selection for `role` and return the resolved color.
    ///
    /// The caller decides whether a re-render is needed: background and
    /// normal-note changes repaint existing rectangles, a playing-note
    /// change only affects future highlight events.
    pub fn apply(&mut self, role: ColorRole, mode: ColorMode, hex: &str) -> Color32 {
        let color = resolve(role, mode, hex);
        let choice = ColorChoice { mode, hex: hex.to_owned() };
        match role {
            ColorRole::Background => {
                self.background_choice = choice;
                self.background = color;
            }
            ColorRole::NormalNote => {
                self.normal_note_choice = choice;
                self.normal_note = color;
            }
            ColorRole::PlayingNote => {
                self.playing_note_choice = choice;
                self.playing_note = color;
            }
        }
        color
    }

    /// Re-resolve all three roles from their stored choices.
    /// Used after deserializing persisted selections.
    pub fn resolve_all(&mut self) {
        self.background = resolve(
            ColorRole::Background,
            self.background_choice.mode,
            &self.background_choice.hex,
        );
        self.normal_note = resolve(
            ColorRole::NormalNote,
            self.normal_note_choice.mode,
            &self.normal_note_choice.hex,
        );
        self.playing_note = resolve(
            ColorRole::PlayingNote,
            self.playing_note_choice.mode,
            &self.playing_note_choice.hex,
        );
    }
}
