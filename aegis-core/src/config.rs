#![forbid(unsafe_code)]

use aegis_parse::DEFAULT_MAX_DEPTH;

use crate::foreign::{ForeignDeclError, ForeignTable};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Deepest expression/block nesting the parser accepts before reporting
    /// a resource-limit error.
    pub max_depth: usize,
    /// Foreign functions every unit may call.
    pub foreign: ForeignTable,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            foreign: ForeignTable::standard(),
        }
    }
}

impl CompilerConfig {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn with_foreign(mut self, foreign: ForeignTable) -> Self {
        self.foreign = foreign;
        self
    }

    /// Adds one foreign signature on top of the current table.
    pub fn declare_foreign(mut self, name: &str, signature: &str) -> Result<Self, ForeignDeclError> {
        self.foreign.declare(name, signature)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn defaults_use_the_standard_runtime() {
        let cfg = CompilerConfig::default();
        assert_eq!(cfg.max_depth, DEFAULT_MAX_DEPTH);
        assert!(cfg.foreign.get("print").is_some());
    }

    #[test]
    fn builder_overrides_and_extends() {
        let cfg = CompilerConfig::default()
            .with_max_depth(0)
            .with_foreign(ForeignTable::empty())
            .declare_foreign("now", "fn() -> int")
            .unwrap();
        assert_eq!(cfg.max_depth, 1);
        assert_eq!(cfg.foreign.len(), 1);
        assert_eq!(cfg.foreign.get("now").unwrap().ret, Type::Int);
    }
}
