mod binary;
mod compressed;
mod text;

pub use binary::BinaryInput;
pub use binary::BinaryOutput;
pub use compressed::CompressedInput;
pub use compressed::CompressedOutput;
pub use compressed::SnapshotInfo;
pub use text::TextInput;
pub use text::TextOutput;

use crate::prelude::Float;

/// Run type tag stored in snapshot headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunTypeId {
    Sph,
    Nbody,
}

impl RunTypeId {
    pub fn as_u8(self) -> u8 {
        match self {
            RunTypeId::Sph => 0,
            RunTypeId::Nbody => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(RunTypeId::Sph),
            1 => Some(RunTypeId::Nbody),
            _ => None,
        }
    }
}

/// Metadata accompanying a stored snapshot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnapshotMeta {
    pub time: Float,
    pub run_type: RunTypeId,
}

impl SnapshotMeta {
    pub fn new(time: Float, run_type: RunTypeId) -> Self {
        Self { time, run_type }
    }
}
