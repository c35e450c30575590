// crates/types/src/source.rs
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// The backend endpoints a dashboard visit pulls from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Stats,
    Jobs,
    Activity,
    Performance,
    Analytics,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Stats,
        SourceKind::Jobs,
        SourceKind::Activity,
        SourceKind::Performance,
        SourceKind::Analytics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Stats => "stats",
            SourceKind::Jobs => "jobs",
            SourceKind::Activity => "activity",
            SourceKind::Performance => "performance",
            SourceKind::Analytics => "analytics",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
