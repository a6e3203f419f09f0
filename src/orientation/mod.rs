//! Finding the upright orientation of a document.
//!
//! We don't have any direct signal telling us which way is up. Instead, we
//! OCR a few rotated views of the image, and we pick the view whose text
//! looks most like the document we expect to see.

use std::fmt;

use schemars::{JsonSchema, r#gen::SchemaGenerator, schema::Schema};

use crate::prelude::*;

pub mod scorer;
pub mod search;

/// A clockwise rotation, in whole quarter turns.
///
/// Serialized as a plain number of degrees: `0`, `90`, `180` or `270`.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(try_from = "u16", into = "u16")]
pub struct Angle(u16);

impl Angle {
    /// No rotation.
    pub const DEG_0: Angle = Angle(0);
    /// A quarter turn clockwise.
    pub const DEG_90: Angle = Angle(90);
    /// A half turn.
    pub const DEG_180: Angle = Angle(180);
    /// Three quarter turns clockwise.
    pub const DEG_270: Angle = Angle(270);

    /// All the angles we know how to produce.
    pub const ALL: [Angle; 4] = [Self::DEG_0, Self::DEG_90, Self::DEG_180, Self::DEG_270];

    /// The rotation in degrees.
    pub fn degrees(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for Angle {
    type Error = anyhow::Error;

    fn try_from(degrees: u16) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|angle| angle.0 == degrees)
            .ok_or_else(|| {
                anyhow!("unsupported rotation {degrees}, expected 0, 90, 180 or 270")
            })
    }
}

impl From<Angle> for u16 {
    fn from(angle: Angle) -> Self {
        angle.0
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

impl JsonSchema for Angle {
    fn schema_name() -> String {
        "Angle".to_owned()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        u16::json_schema(generator)
    }
}
