//! Distance attenuation models.
//!
//! Every model maps `(distance, rolloff, reference_distance, max_distance)` to a
//! gain in `[0, 1]`. The functions are pure; a context selects one with
//! [`DistanceModel`] and may swap it at any time.

/// Signature shared by all attenuation functions.
pub type DistanceFn = fn(distance: f32, rolloff: f32, reference: f32, max: f32) -> f32;

/// Selectable attenuation model for a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceModel {
    /// No attenuation, gain is always 1.
    None,
    Inverse,
    /// The model contexts start with.
    #[default]
    InverseClamped,
    Linear,
    LinearClamped,
    Exponent,
    ExponentClamped,
}

impl DistanceModel {
    pub const ALL: [DistanceModel; 7] = [
        DistanceModel::None,
        DistanceModel::Inverse,
        DistanceModel::InverseClamped,
        DistanceModel::Linear,
        DistanceModel::LinearClamped,
        DistanceModel::Exponent,
        DistanceModel::ExponentClamped,
    ];

    /// The attenuation function implementing this model.
    pub fn function(self) -> DistanceFn {
        match self {
            Self::None => none,
            Self::Inverse => inverse,
            Self::InverseClamped => inverse_clamped,
            Self::Linear => linear,
            Self::LinearClamped => linear_clamped,
            Self::Exponent => exponent,
            Self::ExponentClamped => exponent_clamped,
        }
    }

    pub fn gain(self, distance: f32, rolloff: f32, reference: f32, max: f32) -> f32 {
        (self.function())(distance, rolloff, reference, max)
    }

    pub fn is_clamped(self) -> bool {
        matches!(
            self,
            Self::InverseClamped | Self::LinearClamped | Self::ExponentClamped
        )
    }
}

fn finish(gain: f32) -> f32 {
    if gain.is_finite() {
        gain.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

pub fn none(_distance: f32, _rolloff: f32, _reference: f32, _max: f32) -> f32 {
    1.0
}

pub fn inverse(distance: f32, rolloff: f32, reference: f32, max: f32) -> f32 {
    if max <= reference {
        return 1.0;
    }
    let denominator = reference + rolloff * (distance - reference);
    if denominator <= 0.0 {
        return 1.0;
    }
    finish(reference / denominator)
}

pub fn inverse_clamped(distance: f32, rolloff: f32, reference: f32, max: f32) -> f32 {
    if max <= reference {
        return 1.0;
    }
    inverse(distance.clamp(reference, max), rolloff, reference, max)
}

pub fn linear(distance: f32, rolloff: f32, reference: f32, max: f32) -> f32 {
    let span = max - reference;
    if span <= 0.0 {
        return 1.0;
    }
    // The linear model never attenuates past max distance, clamped or not.
    let distance = distance.min(max);
    finish(1.0 - rolloff * (distance - reference) / span)
}

pub fn linear_clamped(distance: f32, rolloff: f32, reference: f32, max: f32) -> f32 {
    if max <= reference {
        return 1.0;
    }
    linear(distance.clamp(reference, max), rolloff, reference, max)
}

pub fn exponent(distance: f32, rolloff: f32, reference: f32, max: f32) -> f32 {
    if max <= reference || reference <= 0.0 || distance <= 0.0 {
        return 1.0;
    }
    finish((distance / reference).powf(-rolloff))
}

pub fn exponent_clamped(distance: f32, rolloff: f32, reference: f32, max: f32) -> f32 {
    if max <= reference {
        return 1.0;
    }
    exponent(distance.clamp(reference, max), rolloff, reference, max)
}
