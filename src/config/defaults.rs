//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [workspace] Section Defaults
// ============================================================================

pub mod workspace {
    use std::path::PathBuf;

    pub fn root() -> Option<PathBuf> {
        None
    }

    pub fn path() -> PathBuf {
        "src".into()
    }

    pub fn pages() -> PathBuf {
        "pages".into()
    }

    pub fn apis() -> PathBuf {
        "api".into()
    }

    pub fn layouts() -> PathBuf {
        "layouts".into()
    }

    pub fn output() -> PathBuf {
        "public".into()
    }

    pub fn scratch() -> PathBuf {
        ".loam".into()
    }
}

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use super::super::Optimization;

    pub fn base_path() -> String {
        "".into()
    }

    pub fn optimization() -> Optimization {
        Optimization::default()
    }
}

// ============================================================================
// [dev_server] Section Defaults
// ============================================================================

pub mod dev_server {
    pub fn host() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        1984
    }

    pub fn extensions() -> Vec<String> {
        Vec::new()
    }
}

// ============================================================================
// [markdown] Section Defaults
// ============================================================================

pub mod markdown {
    pub fn plugins() -> Vec<String> {
        Vec::new()
    }

    pub fn extensions() -> Vec<String> {
        vec!["md".into()]
    }
}

// ============================================================================
// [polyfills] Section Defaults
// ============================================================================

pub mod polyfills {
    use super::super::ImportAttribute;

    pub fn import_attributes() -> Vec<ImportAttribute> {
        Vec::new()
    }
}
