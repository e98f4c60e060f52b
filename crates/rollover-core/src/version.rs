//! Build identification, logged once at startup.

/// Version, CI build number and git revision of this binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub build: &'static str,
    pub revision: &'static str,
}

impl BuildInfo {
    /// Values captured at compile time from `ROLLOVER_BUILD` and `ROLLOVER_REV`.
    pub const fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            build: match option_env!("ROLLOVER_BUILD") {
                Some(b) => b,
                None => "N/A",
            },
            revision: match option_env!("ROLLOVER_REV") {
                Some(r) => r,
                None => "local",
            },
        }
    }
}
