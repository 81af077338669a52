//! Named encoding presets and the parameter set submitted with a job.

/// Resolved encoding parameters for one submission.
///
/// `extra_args` is an ordered list of encoder arguments passed through to
/// the worker opaquely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingRequest {
    pub codec: String,
    pub crf: u32,
    pub extra_args: Vec<String>,
}

impl EncodingRequest {
    /// Manually entered parameters, used when no preset is selected.
    pub fn manual(codec: impl Into<String>, crf: u32) -> Self {
        Self {
            codec: codec.into(),
            crf,
            extra_args: Vec::new(),
        }
    }
}

/// Named bundle of encoding parameters.
///
/// Resolving a preset has no side effects; an unrecognized identifier
/// resolves to [`Preset::Standard`] so a stale UI value never blocks a
/// submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    #[default]
    Standard,
    Hevc720,
    Av1Extreme720,
    Vp9Web720,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::Standard,
        Preset::Hevc720,
        Preset::Av1Extreme720,
        Preset::Vp9Web720,
    ];

    /// Resolve a preset identifier, falling back to the default preset for
    /// anything unrecognized.
    pub fn parse(id: &str) -> Self {
        match id {
            "standard" => Preset::Standard,
            "h265_720" => Preset::Hevc720,
            "av1_720_extreme" => Preset::Av1Extreme720,
            "vp9_720_web" => Preset::Vp9Web720,
            _ => Preset::Standard,
        }
    }

    /// Stable identifier, the inverse of [`Preset::parse`].
    pub fn id(self) -> &'static str {
        match self {
            Preset::Standard => "standard",
            Preset::Hevc720 => "h265_720",
            Preset::Av1Extreme720 => "av1_720_extreme",
            Preset::Vp9Web720 => "vp9_720_web",
        }
    }

    /// The next preset in cycling order, wrapping around.
    pub fn next(self) -> Self {
        match self {
            Preset::Standard => Preset::Hevc720,
            Preset::Hevc720 => Preset::Av1Extreme720,
            Preset::Av1Extreme720 => Preset::Vp9Web720,
            Preset::Vp9Web720 => Preset::Standard,
        }
    }

    /// Fixed (codec, crf, extra args) triple for this preset.
    pub fn request(self) -> EncodingRequest {
        match self {
            Preset::Standard => EncodingRequest {
                codec: "libx264".to_string(),
                crf: 23,
                extra_args: vec![],
            },
            Preset::Hevc720 => EncodingRequest {
                codec: "libx265".to_string(),
                crf: 26,
                extra_args: vec!["-vf".into(), "scale=-2:720".into()],
            },
            Preset::Av1Extreme720 => EncodingRequest {
                codec: "libaom-av1".to_string(),
                crf: 34,
                extra_args: vec![
                    "-vf".into(),
                    "scale=-2:720".into(),
                    "-cpu-used".into(),
                    "6".into(),
                    "-row-mt".into(),
                    "1".into(),
                ],
            },
            Preset::Vp9Web720 => EncodingRequest {
                codec: "libvpx-vp9".to_string(),
                crf: 32,
                extra_args: vec![
                    "-vf".into(),
                    "scale=-2:720".into(),
                    "-row-mt".into(),
                    "1".into(),
                ],
            },
        }
    }
}
