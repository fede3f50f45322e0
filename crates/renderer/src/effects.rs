use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::shaders;

/// Image-space transform applied to every rendered camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Effect {
    /// Identity pass-through.
    #[default]
    Normal,
    Mirror,
    VMirror,
    Convex,
    Concave,
    Wave,
    Rainbow,
    Fisheye,
    Kaleidoscope,
    Pixelate,
    OilPainting,
    Neon,
    Swirl,
    /// Chromatic aberration. Listed last in the catalog.
    RgbShift,
    /// Colour-keyed removal of strongly red pixels. The work happens on the
    /// CPU; the fragment program is the identity.
    RedRemove,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown effect id '{0}'")]
pub struct UnknownEffect(pub String);

impl Effect {
    pub const ALL: [Effect; 15] = [
        Effect::Normal,
        Effect::Mirror,
        Effect::VMirror,
        Effect::Convex,
        Effect::Concave,
        Effect::Wave,
        Effect::Rainbow,
        Effect::Fisheye,
        Effect::Kaleidoscope,
        Effect::Pixelate,
        Effect::OilPainting,
        Effect::Neon,
        Effect::Swirl,
        Effect::RgbShift,
        Effect::RedRemove,
    ];

    pub const fn id(self) -> &'static str {
        match self {
            Effect::Normal => "normal",
            Effect::Mirror => "mirror",
            Effect::VMirror => "vmirror",
            Effect::Convex => "convex",
            Effect::Concave => "concave",
            Effect::Wave => "wave",
            Effect::Rainbow => "rainbow",
            Effect::Fisheye => "fisheye",
            Effect::Kaleidoscope => "kaleidoscope",
            Effect::Pixelate => "pixelate",
            Effect::OilPainting => "oilpainting",
            Effect::Neon => "neon",
            Effect::Swirl => "swirl",
            Effect::RgbShift => "rgbshift",
            Effect::RedRemove => "redRemove",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Effect::Normal => "Normal",
            Effect::Mirror => "Horizontal Mirror",
            Effect::VMirror => "Vertical Mirror",
            Effect::Convex => "Convex Mirror",
            Effect::Concave => "Concave Mirror",
            Effect::Wave => "Wave",
            Effect::Rainbow => "Rainbow Twist",
            Effect::Fisheye => "Fisheye",
            Effect::Kaleidoscope => "Kaleidoscope",
            Effect::Pixelate => "Pixel Art",
            Effect::OilPainting => "Oil Painting",
            Effect::Neon => "Neon Edges",
            Effect::Swirl => "Swirl",
            Effect::RgbShift => "RGB Shift",
            Effect::RedRemove => "Red Remove",
        }
    }

    /// Exact match on the textual id.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|effect| effect.id() == id)
    }

    /// Whether frames must pass through the CPU pre-processor before upload.
    pub const fn needs_cpu_pass(self) -> bool {
        matches!(self, Effect::Mirror | Effect::RedRemove)
    }

    /// Whether the output surface is cleared before drawing. Effects whose
    /// program writes every pixel skip the clear.
    pub const fn needs_clear(self) -> bool {
        !matches!(self, Effect::Normal | Effect::Mirror | Effect::VMirror)
    }

    pub fn fragment_shader(self) -> String {
        shaders::fragment_shader(self)
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Effect {
    type Err = UnknownEffect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s.trim()).ok_or_else(|| UnknownEffect(s.to_string()))
    }
}

impl Serialize for Effect {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.id())
    }
}

/// Catalog entry describing a selectable effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectDescriptor {
    pub effect: Effect,
    pub id: &'static str,
    pub display_name: &'static str,
}

impl EffectDescriptor {
    pub const fn new(effect: Effect) -> Self {
        Self {
            effect,
            id: effect.id(),
            display_name: effect.display_name(),
        }
    }

    pub fn fragment_program_source(&self) -> String {
        self.effect.fragment_shader()
    }
}

const CATALOG: [EffectDescriptor; 13] = [
    EffectDescriptor::new(Effect::Mirror),
    EffectDescriptor::new(Effect::VMirror),
    EffectDescriptor::new(Effect::Convex),
    EffectDescriptor::new(Effect::Concave),
    EffectDescriptor::new(Effect::Wave),
    EffectDescriptor::new(Effect::Rainbow),
    EffectDescriptor::new(Effect::Fisheye),
    EffectDescriptor::new(Effect::Kaleidoscope),
    EffectDescriptor::new(Effect::Pixelate),
    EffectDescriptor::new(Effect::OilPainting),
    EffectDescriptor::new(Effect::Neon),
    EffectDescriptor::new(Effect::Swirl),
    EffectDescriptor::new(Effect::RgbShift),
];

/// User-facing effects in presentation order.
pub fn catalog() -> &'static [EffectDescriptor] {
    &CATALOG
}
