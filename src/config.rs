//! Evaluation settings read from the environment.
//!
//! | variable            | effect                                                           |
//! |---------------------|------------------------------------------------------------------|
//! | `SAMPLEX_PARALLEL`  | `1`/`true` distributes element loops over the rayon thread pool |
//! | `SAMPLEX_GRAPHVIZ`  | directory in which a `.dot` rendering of every executed graph is written |
//! | `SAMPLEX_DEBUG`     | colon-separated debug flags (`sparse`, `lower`, `evalf`) or `all` |
//!
//! The `sparse` and `lower` debug flags are enabled by default in debug builds.
use log::warn;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Consistency checks performed during lowering and evaluation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct DebugFlags {
    /// Validate raw sparse results before they are returned.
    pub sparse: bool,
    /// Check that lowered evaluables have the dimension of the lowered expression.
    pub lower: bool,
    /// Check every evaluated value against the statically inferred shape.
    pub evalf: bool,
}

impl DebugFlags {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            sparse: true,
            lower: true,
            evalf: true,
        }
    }

    fn build_default() -> Self {
        if cfg!(debug_assertions) {
            Self {
                sparse: true,
                lower: true,
                evalf: false,
            }
        } else {
            Self::none()
        }
    }

    /// Parses a flag specification such as `"sparse:evalf"` or `"all"`.
    ///
    /// Flags are added to the build default. Unknown flags are reported and ignored.
    pub fn parse(spec: &str) -> Self {
        if spec.trim() == "all" {
            return Self::all();
        }
        let mut flags = Self::build_default();
        for flag in spec.split(':').map(str::trim).filter(|flag| !flag.is_empty()) {
            match flag.to_lowercase().as_str() {
                "sparse" => flags.sparse = true,
                "lower" => flags.lower = true,
                "evalf" => flags.evalf = true,
                unknown => warn!("ignoring unknown debug flag {unknown:?}"),
            }
        }
        flags
    }
}

/// Configuration of the evaluation pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationConfig {
    pub parallel: bool,
    pub graphviz: Option<PathBuf>,
    pub debug: DebugFlags,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            graphviz: None,
            debug: DebugFlags::build_default(),
        }
    }
}

impl EvaluationConfig {
    /// Reads the configuration from the `SAMPLEX_*` environment variables.
    pub fn from_env() -> Self {
        let parallel = env::var("SAMPLEX_PARALLEL")
            .map(|value| matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let graphviz = env::var_os("SAMPLEX_GRAPHVIZ")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        let debug = env::var("SAMPLEX_DEBUG")
            .map(|spec| DebugFlags::parse(&spec))
            .unwrap_or_else(|_| DebugFlags::build_default());
        Self {
            parallel,
            graphviz,
            debug,
        }
    }

    /// The process-wide configuration, read from the environment on first access.
    pub fn global() -> &'static EvaluationConfig {
        static GLOBAL: OnceLock<EvaluationConfig> = OnceLock::new();
        GLOBAL.get_or_init(Self::from_env)
    }

    pub fn with_parallel(self, parallel: bool) -> Self {
        Self { parallel, ..self }
    }

    pub fn with_graphviz(self, directory: impl Into<PathBuf>) -> Self {
        Self {
            graphviz: Some(directory.into()),
            ..self
        }
    }

    pub fn with_debug(self, debug: DebugFlags) -> Self {
        Self { debug, ..self }
    }
}
