/// Unique id of a particle quantity. The numeric values are part of
/// the binary snapshot format and must not be reordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum QuantityId {
    /// Positions and their derivatives; always a vector quantity of
    /// second order. The fourth component carries the smoothing length.
    Position = 0,
    /// Particle masses, constant during the run.
    Mass = 1,
    Density = 2,
    /// Pressure from the equation of state, not reduced by damage.
    Pressure = 3,
    /// Specific internal energy.
    Energy = 4,
    SoundSpeed = 5,
    /// Deviatoric stress, always a traceless tensor.
    DeviatoricStress = 6,
    /// Velocity gradient accumulated during the precompute phase.
    VelocityGradient = 7,
    VelocityDivergence = 8,
    VelocityRotation = 9,
    /// Per-particle coefficient of the Morris-Monaghan viscosity.
    AvAlpha = 10,
    /// Stress reduction factor of the yielding rheology.
    StressReducing = 11,
    /// Third root of the scalar damage (Benz & Asphaug); the tensile
    /// reduction factor is its cube.
    Damage = 12,
    /// Lowest activation strain among the flaws of a particle.
    EpsMin = 13,
    /// Exponent of the stretched Weibull distribution of the particle.
    MZero = 14,
    /// Growth rate of activated fractures.
    ExplicitGrowth = 15,
    /// Number of explicit flaws of a particle.
    NFlaws = 16,
    /// Index into the material sequence of the storage.
    MaterialIdx = 17,
}

impl QuantityId {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        use QuantityId::*;
        [
            Position,
            Mass,
            Density,
            Pressure,
            Energy,
            SoundSpeed,
            DeviatoricStress,
            VelocityGradient,
            VelocityDivergence,
            VelocityRotation,
            AvAlpha,
            StressReducing,
            Damage,
            EpsMin,
            MZero,
            ExplicitGrowth,
            NFlaws,
            MaterialIdx,
        ]
        .into_iter()
        .find(|id| id.as_u16() == value)
    }

    /// Column name used by the text snapshot format.
    pub fn name(self) -> &'static str {
        match self {
            QuantityId::Position => "position",
            QuantityId::Mass => "mass",
            QuantityId::Density => "density",
            QuantityId::Pressure => "pressure",
            QuantityId::Energy => "energy",
            QuantityId::SoundSpeed => "sound_speed",
            QuantityId::DeviatoricStress => "deviatoric_stress",
            QuantityId::VelocityGradient => "velocity_gradient",
            QuantityId::VelocityDivergence => "velocity_divergence",
            QuantityId::VelocityRotation => "velocity_rotation",
            QuantityId::AvAlpha => "av_alpha",
            QuantityId::StressReducing => "stress_reducing",
            QuantityId::Damage => "damage",
            QuantityId::EpsMin => "eps_min",
            QuantityId::MZero => "m_zero",
            QuantityId::ExplicitGrowth => "explicit_growth",
            QuantityId::NFlaws => "n_flaws",
            QuantityId::MaterialIdx => "material_idx",
        }
    }

}
