//! Symbolic execution flags and the backend command they produce.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Flags used when none are given.
pub const DEFAULT_FLAGS: &str = "--silent-klee-assume --warnings-only-to-file";

/// Extra flags passed to the symbolic execution engine. Stored trimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolicExecutionFlags(String);

impl SymbolicExecutionFlags {
    pub fn new(flags: impl AsRef<str>) -> Self {
        Self(flags.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SymbolicExecutionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The command the backend runs for symbolic execution of `project_id`.
pub fn command_preview(project_id: &str, flags: &SymbolicExecutionFlags) -> String {
    let flags = if flags.is_empty() {
        DEFAULT_FLAGS
    } else {
        flags.as_str()
    };
    format!("klee --libc=klee {} {}.bc", flags, project_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_trimmed() {
        let flags = SymbolicExecutionFlags::new("  --max-time=60 \n");
        assert_eq!(flags.as_str(), "--max-time=60");
        assert!(SymbolicExecutionFlags::new("   ").is_empty());
    }

    #[test]
    fn test_preview_with_default_flags() {
        assert_eq!(
            command_preview("p1", &SymbolicExecutionFlags::default()),
            "klee --libc=klee --silent-klee-assume --warnings-only-to-file p1.bc"
        );
    }

    #[test]
    fn test_preview_with_custom_flags() {
        let flags = SymbolicExecutionFlags::new("--max-time=60 --emit-all-errors");
        assert_eq!(
            command_preview("p1", &flags),
            "klee --libc=klee --max-time=60 --emit-all-errors p1.bc"
        );
    }
}
