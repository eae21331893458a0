// THEORY:
// The disease table is static reference data: four classes the remote
// classifier can return, each with a short description and advice. The remote
// label is parsed into a closed `DiseaseClass` so an unexpected label is an
// error at the boundary instead of a silent missing lookup further in.

use crate::error::VineError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// How serious a diagnosis is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    None,
    Medium,
    High,
    VeryHigh,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::None => "None",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::VeryHigh => "Very High",
        }
    }
}

/// Display metadata for one disease class.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct DiseaseInfo {
    pub emoji: &'static str,
    pub description: &'static str,
    pub severity: Severity,
    pub treatment: &'static str,
}

/// Every class the classification service can predict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiseaseClass {
    BlackRot,
    Esca,
    Healthy,
    LeafBlight,
}

static BLACK_ROT: DiseaseInfo = DiseaseInfo {
    emoji: "🔴",
    description: "Black rot - a serious fungal disease that causes circular brown spots on the leaves.",
    severity: Severity::High,
    treatment: "Copper fungicides, pruning of affected parts, improved ventilation",
};

static ESCA: DiseaseInfo = DiseaseInfo {
    emoji: "🟤",
    description: "ESCA - a fungal complex that causes measles-like spots on the leaves.",
    severity: Severity::VeryHigh,
    treatment: "No definitive cure; preventive management with systemic fungicides",
};

static HEALTHY: DiseaseInfo = DiseaseInfo {
    emoji: "🟢",
    description: "Healthy leaf - no detectable signs of disease.",
    severity: Severity::None,
    treatment: "Continue preventive management practices",
};

static LEAF_BLIGHT: DiseaseInfo = DiseaseInfo {
    emoji: "🟡",
    description: "Leaf blight - a disease that causes necrotic spots and yellowing.",
    severity: Severity::Medium,
    treatment: "Preventive fungicides, better drainage, avoid foliar irrigation",
};

impl DiseaseClass {
    pub const ALL: [DiseaseClass; 4] = [
        DiseaseClass::BlackRot,
        DiseaseClass::Esca,
        DiseaseClass::Healthy,
        DiseaseClass::LeafBlight,
    ];

    /// The label the classification service uses on the wire.
    pub fn label(self) -> &'static str {
        match self {
            DiseaseClass::BlackRot => "Black Rot",
            DiseaseClass::Esca => "ESCA (Black measles)",
            DiseaseClass::Healthy => "Healthy",
            DiseaseClass::LeafBlight => "Leaf Blight",
        }
    }

    pub fn info(self) -> &'static DiseaseInfo {
        match self {
            DiseaseClass::BlackRot => &BLACK_ROT,
            DiseaseClass::Esca => &ESCA,
            DiseaseClass::Healthy => &HEALTHY,
            DiseaseClass::LeafBlight => &LEAF_BLIGHT,
        }
    }

    pub fn from_label(label: &str) -> Result<Self, VineError> {
        Self::ALL
            .into_iter()
            .find(|class| class.label() == label)
            .ok_or_else(|| VineError::UnknownClass(label.to_string()))
    }
}

impl FromStr for DiseaseClass {
    type Err = VineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s)
    }
}

impl fmt::Display for DiseaseClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
