//! Locating the backing store.
//!
//! A connection descriptor is looked up in order from an explicitly
//! configured value, the process environment, a per-user env file and a
//! machine-wide env file. The first level holding a usable value wins. An
//! empty value or the placeholder [`PLACEHOLDER`] counts as unset, so
//! deployment templates can ship `HILO_CONNECTION=STUB` and have it
//! overridden further down the chain.
//!
//! ```
//! use hilo::connection::{ConnectionResolver, StoreDescriptor};
//!
//! let resolver = ConnectionResolver::new(Some("memory:".to_owned())).with_scopes(Vec::new());
//! assert_eq!(resolver.resolve_descriptor()?, StoreDescriptor::Memory);
//! # Ok::<(), hilo::Error>(())
//! ```

use core::{fmt, str::FromStr};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable holding the connection descriptor.
pub const CONNECTION_VAR: &str = "HILO_CONNECTION";

/// Value treated as "not configured" at every level.
pub const PLACEHOLDER: &str = "STUB";

const USER_ENV_FILE: &str = ".config/hilo/hilo.env";
const MACHINE_ENV_FILE: &str = "/etc/hilo/hilo.env";

fn usable(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty() && v != PLACEHOLDER)
}

/// A place environment variables can be read from.
pub trait EnvScope: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Looks up `key`. A missing variable is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Misconfigured`] if the scope exists but cannot be
    /// read.
    fn var(&self, key: &str) -> Result<Option<String>>;
}

/// The current process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnv;

impl EnvScope for ProcessEnv {
    fn name(&self) -> &str {
        "process"
    }

    fn var(&self, key: &str) -> Result<Option<String>> {
        match std::env::var(key) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(Error::Misconfigured {
                reason: format!("{key} in the process environment is not valid unicode"),
            }),
        }
    }
}

/// A dotenv-format file. A missing file holds no variables.
#[derive(Clone, Debug)]
pub struct EnvFile {
    name: String,
    path: PathBuf,
}

impl EnvFile {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// `$HOME/.config/hilo/hilo.env`, or `None` without a home directory.
    pub fn user() -> Option<Self> {
        let home = std::env::var_os("HOME").filter(|home| !home.is_empty())?;
        Some(Self::new("user", Path::new(&home).join(USER_ENV_FILE)))
    }

    /// `/etc/hilo/hilo.env`.
    pub fn machine() -> Self {
        Self::new("machine", MACHINE_ENV_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn misconfigured(&self, e: impl fmt::Display) -> Error {
        Error::Misconfigured {
            reason: format!("{} env file {}: {e}", self.name, self.path.display()),
        }
    }
}

impl EnvScope for EnvFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn var(&self, key: &str) -> Result<Option<String>> {
        let entries = match dotenvy::from_path_iter(&self.path) {
            Ok(entries) => entries,
            Err(e) if e.not_found() => return Ok(None),
            Err(e) => return Err(self.misconfigured(e)),
        };

        // Later assignments override earlier ones, as when sourcing the file.
        let mut found = None;
        for entry in entries {
            let (k, v) = entry.map_err(|e| self.misconfigured(e))?;
            if k == key {
                found = Some(v);
            }
        }
        Ok(found)
    }
}

/// Where a resolved connection came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Configured,
    Scope(String),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configured => f.write_str("configuration"),
            Self::Scope(name) => write!(f, "{name} environment"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    pub value: String,
    pub source: Source,
}

/// Finds the connection descriptor.
pub struct ConnectionResolver {
    configured: Option<String>,
    variable: String,
    scopes: Vec<Box<dyn EnvScope>>,
}

impl ConnectionResolver {
    /// A resolver over `configured`, then the process, user and machine
    /// scopes, reading [`CONNECTION_VAR`].
    pub fn new(configured: Option<String>) -> Self {
        let mut scopes: Vec<Box<dyn EnvScope>> = vec![Box::new(ProcessEnv)];
        if let Some(user) = EnvFile::user() {
            scopes.push(Box::new(user));
        }
        scopes.push(Box::new(EnvFile::machine()));
        Self {
            configured,
            variable: CONNECTION_VAR.to_owned(),
            scopes,
        }
    }

    /// Replaces the environment scopes, consulted in the given order.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<Box<dyn EnvScope>>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Reads `variable` instead of [`CONNECTION_VAR`].
    #[must_use]
    pub fn variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = variable.into();
        self
    }

    /// Returns the first usable value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Misconfigured`] if no level holds a usable value or a
    /// scope cannot be read.
    pub fn resolve(&self) -> Result<Resolved> {
        if let Some(value) = usable(self.configured.clone()) {
            return Ok(Resolved {
                value,
                source: Source::Configured,
            });
        }

        for scope in &self.scopes {
            if let Some(value) = usable(scope.var(&self.variable)?) {
                #[cfg(feature = "tracing")]
                tracing::debug!("Using {} from the {} scope", self.variable, scope.name());
                return Ok(Resolved {
                    value,
                    source: Source::Scope(scope.name().to_owned()),
                });
            }
        }

        let searched: Vec<_> = self.scopes.iter().map(|s| s.name()).collect();
        Err(Error::Misconfigured {
            reason: format!(
                "no store connection configured; set {} (searched configuration, {})",
                self.variable,
                searched.join(", ")
            ),
        })
    }

    /// Resolves and parses the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Misconfigured`] if resolution fails or the value is
    /// not a valid descriptor.
    pub fn resolve_descriptor(&self) -> Result<StoreDescriptor> {
        let resolved = self.resolve()?;
        resolved.value.parse().map_err(|e: Error| match e {
            Error::Misconfigured { reason } => Error::Misconfigured {
                reason: format!("{reason} (from {})", resolved.source),
            },
            other => other,
        })
    }
}

/// Which store to open.
///
/// `memory:` (or `UseDevelopmentStorage=true`) is a fresh in-process store;
/// `file:<path>` a JSON file store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreDescriptor {
    Memory,
    File(PathBuf),
}

impl FromStr for StoreDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "memory:" || s.eq_ignore_ascii_case("UseDevelopmentStorage=true") {
            return Ok(Self::Memory);
        }
        match s.strip_prefix("file:") {
            Some(path) if !path.is_empty() => Ok(Self::File(PathBuf::from(path))),
            Some(_) => Err(Error::Misconfigured {
                reason: "file store descriptor is missing a path".to_owned(),
            }),
            None => Err(Error::Misconfigured {
                reason: format!("unrecognized store descriptor '{s}'"),
            }),
        }
    }
}

impl fmt::Display for StoreDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory:"),
            Self::File(path) => write!(f, "file:{}", path.display()),
        }
    }
}
