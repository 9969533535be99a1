//! Device parameters: the command flag space, typed values, batches

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::capture::format::{Flip, Rotation};
use crate::capture::frame::Rectangle;
use crate::error::{CameraError, Result};

bitflags! {
    /// One bit per independently settable parameter
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Command: u64 {
        const WHITE_BALANCE   = 1 << 0;
        const ISO             = 1 << 1;
        const CONTRAST        = 1 << 2;
        const SATURATION      = 1 << 3;
        const EFFECT          = 1 << 4;
        const SCENE_MODE      = 1 << 5;
        const EXPOSURE_MODE   = 1 << 6;
        const EXPOSURE        = 1 << 7;
        const ROTATION        = 1 << 8;
        const FLIP            = 1 << 9;
        const FOCUS_MODE      = 1 << 10;
        const SHOT_MODE       = 1 << 11;
        const ANTI_HAND_SHAKE = 1 << 12;
        const FOCUS_AREA      = 1 << 13;
        const DIGITAL_ZOOM    = 1 << 14;
        const OPTICAL_ZOOM    = 1 << 15;
        const RECORDING_HINT  = 1 << 16;
    }
}

impl Command {
    pub fn is_single(self) -> bool {
        self.bits().count_ones() == 1
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhiteBalance {
    #[default]
    Auto,
    Daylight,
    Cloudy,
    Fluorescent,
    Incandescent,
    Shade,
    Horizon,
    Flash,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    #[default]
    None,
    Mono,
    Sepia,
    Negative,
    Red,
    Green,
    Blue,
    Aqua,
    Antique,
    Warm,
    Emboss,
    Sketch,
    Solarization,
    Posterization,
    Cartoon,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SceneMode {
    #[default]
    Normal,
    Portrait,
    Landscape,
    Sports,
    PartyIndoor,
    BeachIndoor,
    Sunset,
    DuskDawn,
    FallColor,
    NightScene,
    Firework,
    Text,
    ShowWindow,
    CandleLight,
    Backlight,
    Aqua,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExposureMode {
    Off,
    #[default]
    All,
    Center,
    Spot,
    Custom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShotMode {
    #[default]
    Normal,
    Continuous,
    Hdr,
    Night,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusMode {
    Pan,
    #[default]
    Auto,
    ContinuousAuto,
}

/// Typed payload for exactly one [`Command`] bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlValue {
    WhiteBalance(WhiteBalance),
    Iso(i32),
    Contrast(i32),
    Saturation(i32),
    Effect(Effect),
    SceneMode(SceneMode),
    ExposureMode(ExposureMode),
    Exposure(i32),
    Rotation(Rotation),
    Flip(Flip),
    FocusMode(FocusMode),
    ShotMode(ShotMode),
    AntiHandShake(bool),
    FocusArea(Rectangle),
    DigitalZoom(i32),
    OpticalZoom(i32),
    RecordingHint(bool),
}

impl ControlValue {
    pub fn command(&self) -> Command {
        match self {
            ControlValue::WhiteBalance(_) => Command::WHITE_BALANCE,
            ControlValue::Iso(_) => Command::ISO,
            ControlValue::Contrast(_) => Command::CONTRAST,
            ControlValue::Saturation(_) => Command::SATURATION,
            ControlValue::Effect(_) => Command::EFFECT,
            ControlValue::SceneMode(_) => Command::SCENE_MODE,
            ControlValue::ExposureMode(_) => Command::EXPOSURE_MODE,
            ControlValue::Exposure(_) => Command::EXPOSURE,
            ControlValue::Rotation(_) => Command::ROTATION,
            ControlValue::Flip(_) => Command::FLIP,
            ControlValue::FocusMode(_) => Command::FOCUS_MODE,
            ControlValue::ShotMode(_) => Command::SHOT_MODE,
            ControlValue::AntiHandShake(_) => Command::ANTI_HAND_SHAKE,
            ControlValue::FocusArea(_) => Command::FOCUS_AREA,
            ControlValue::DigitalZoom(_) => Command::DIGITAL_ZOOM,
            ControlValue::OpticalZoom(_) => Command::OPTICAL_ZOOM,
            ControlValue::RecordingHint(_) => Command::RECORDING_HINT,
        }
    }
}

/// Current value of every parameter, as last accepted by the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Controls {
    pub white_balance: WhiteBalance,
    pub iso: i32,
    pub contrast: i32,
    pub saturation: i32,
    pub effect: Effect,
    pub scene_mode: SceneMode,
    pub exposure_mode: ExposureMode,
    pub exposure: i32,
    pub rotation: Rotation,
    pub flip: Flip,
    pub focus_mode: FocusMode,
    pub shot_mode: ShotMode,
    pub anti_hand_shake: bool,
    pub focus_area: Rectangle,
    pub digital_zoom: i32,
    pub optical_zoom: i32,
    pub recording_hint: bool,
}

impl Controls {
    /// Reads the field selected by a single-bit `cmd`.
    pub fn get(&self, cmd: Command) -> Result<ControlValue> {
        if !cmd.is_single() {
            return Err(CameraError::InvalidParameter);
        }
        // bit position selects the field
        let value = match cmd.bits().trailing_zeros() {
            0 => ControlValue::WhiteBalance(self.white_balance),
            1 => ControlValue::Iso(self.iso),
            2 => ControlValue::Contrast(self.contrast),
            3 => ControlValue::Saturation(self.saturation),
            4 => ControlValue::Effect(self.effect),
            5 => ControlValue::SceneMode(self.scene_mode),
            6 => ControlValue::ExposureMode(self.exposure_mode),
            7 => ControlValue::Exposure(self.exposure),
            8 => ControlValue::Rotation(self.rotation),
            9 => ControlValue::Flip(self.flip),
            10 => ControlValue::FocusMode(self.focus_mode),
            11 => ControlValue::ShotMode(self.shot_mode),
            12 => ControlValue::AntiHandShake(self.anti_hand_shake),
            13 => ControlValue::FocusArea(self.focus_area),
            14 => ControlValue::DigitalZoom(self.digital_zoom),
            15 => ControlValue::OpticalZoom(self.optical_zoom),
            16 => ControlValue::RecordingHint(self.recording_hint),
            _ => return Err(CameraError::InvalidParameter),
        };
        Ok(value)
    }

    pub fn set(&mut self, value: ControlValue) {
        match value {
            ControlValue::WhiteBalance(v) => self.white_balance = v,
            ControlValue::Iso(v) => self.iso = v,
            ControlValue::Contrast(v) => self.contrast = v,
            ControlValue::Saturation(v) => self.saturation = v,
            ControlValue::Effect(v) => self.effect = v,
            ControlValue::SceneMode(v) => self.scene_mode = v,
            ControlValue::ExposureMode(v) => self.exposure_mode = v,
            ControlValue::Exposure(v) => self.exposure = v,
            ControlValue::Rotation(v) => self.rotation = v,
            ControlValue::Flip(v) => self.flip = v,
            ControlValue::FocusMode(v) => self.focus_mode = v,
            ControlValue::ShotMode(v) => self.shot_mode = v,
            ControlValue::AntiHandShake(v) => self.anti_hand_shake = v,
            ControlValue::FocusArea(v) => self.focus_area = v,
            ControlValue::DigitalZoom(v) => self.digital_zoom = v,
            ControlValue::OpticalZoom(v) => self.optical_zoom = v,
            ControlValue::RecordingHint(v) => self.recording_hint = v,
        }
    }
}

/// Several parameters applied in one call.
///
/// `flags` selects which fields of `values` are applied; the rest are
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchCommand {
    pub flags: Command,
    pub values: Controls,
}

impl BatchCommand {
    pub fn new() -> Self {
        Self {
            flags: Command::empty(),
            values: Controls::default(),
        }
    }

    /// Adds `value` and sets its bit.
    pub fn with(mut self, value: ControlValue) -> Self {
        self.flags |= value.command();
        self.values.set(value);
        self
    }

    /// Selected values in ascending bit order.
    pub fn entries(&self) -> impl Iterator<Item = ControlValue> + '_ {
        self.flags
            .iter()
            .filter_map(move |cmd| self.values.get(cmd).ok())
    }
}

impl Default for BatchCommand {
    fn default() -> Self {
        Self::new()
    }
}
