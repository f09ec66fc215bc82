//! Pipeline stages.

use std::fmt;

/// One step of the fixed build order.
///
/// The derived `Ord` is the execution order: a stage never runs before all of
/// its predecessors have completed within one [`Manager`](crate::Manager).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Configure,
    Validate,
    Glob,
    Load,
    Transform,
    Render,
    Collect,
    Write,
    Cleanup,
}

impl Stage {
    /// Every stage, in execution order.
    pub const ALL: [Stage; 9] = [
        Stage::Configure,
        Stage::Validate,
        Stage::Glob,
        Stage::Load,
        Stage::Transform,
        Stage::Render,
        Stage::Collect,
        Stage::Write,
        Stage::Cleanup,
    ];

    /// Lowercase name used in logs and error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Configure => "configure",
            Stage::Validate => "validate",
            Stage::Glob => "glob",
            Stage::Load => "load",
            Stage::Transform => "transform",
            Stage::Render => "render",
            Stage::Collect => "collect",
            Stage::Write => "write",
            Stage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
