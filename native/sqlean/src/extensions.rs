/// Extension boundary configuration.
///
/// The bundled SQL functions come in named groups. Which groups a connection
/// loads is a process-wide signal kept in environment variables:
/// - `SQLEAN_ENABLE=0` disables every group, any other value enables every group
/// - otherwise `SQLEAN_ENABLE_<GROUP>` enables one group unless it is `0`
///
/// The signal is snapshotted when a connection opens and never re-read for
/// that connection, so changes only affect connections opened later.
use crate::constants::{ENV_ENABLE_ALL, ENV_ENABLE_PREFIX, ENV_LIBRARY, EXTENSION_ENTRY_POINT};
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// One group of bundled SQL functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtensionGroup {
    Crypto,
    Define,
    Fileio,
    Fuzzy,
    #[cfg(not(windows))]
    Ipaddr,
    Regexp,
    Stats,
    Text,
    Unicode,
    Uuid,
    Vsv,
}

impl ExtensionGroup {
    /// Every group available on this platform.
    pub const ALL: &'static [Self] = &[
        Self::Crypto,
        Self::Define,
        Self::Fileio,
        Self::Fuzzy,
        #[cfg(not(windows))]
        Self::Ipaddr,
        Self::Regexp,
        Self::Stats,
        Self::Text,
        Self::Unicode,
        Self::Uuid,
        Self::Vsv,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Crypto => "crypto",
            Self::Define => "define",
            Self::Fileio => "fileio",
            Self::Fuzzy => "fuzzy",
            #[cfg(not(windows))]
            Self::Ipaddr => "ipaddr",
            Self::Regexp => "regexp",
            Self::Stats => "stats",
            Self::Text => "text",
            Self::Unicode => "unicode",
            Self::Uuid => "uuid",
            Self::Vsv => "vsv",
        }
    }

    /// Group for a lower-case name; `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|group| group.name() == name)
    }

    /// Environment flag for this group, e.g. `SQLEAN_ENABLE_REGEXP`.
    pub fn env_var(self) -> String {
        format!("{ENV_ENABLE_PREFIX}{}", self.name().to_ascii_uppercase())
    }
}

impl fmt::Display for ExtensionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExtensionGroup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
            .ok_or_else(|| Error::Connection(format!("unknown extension group: {s}")))
    }
}

/// Which groups a connection loads.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExtensionSelection {
    All,
    #[default]
    None,
    Groups(BTreeSet<ExtensionGroup>),
}

impl ExtensionSelection {
    /// Snapshot the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a selection from any key/value source shaped like the environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        match lookup(ENV_ENABLE_ALL) {
            Some(flag) if flag == "0" => return Self::None,
            Some(_) => return Self::All,
            None => {}
        }

        let groups: BTreeSet<ExtensionGroup> = ExtensionGroup::ALL
            .iter()
            .copied()
            .filter(|group| lookup(&group.env_var()).is_some_and(|flag| flag != "0"))
            .collect();

        if groups.is_empty() {
            Self::None
        } else {
            Self::Groups(groups)
        }
    }

    /// Whether at least one group is enabled.
    pub fn enables_any(&self) -> bool {
        match self {
            Self::All => true,
            Self::None => false,
            Self::Groups(groups) => !groups.is_empty(),
        }
    }

    pub fn is_enabled(&self, group: ExtensionGroup) -> bool {
        match self {
            Self::All => true,
            Self::None => false,
            Self::Groups(groups) => groups.contains(&group),
        }
    }

    /// Write this selection into the process environment.
    pub fn apply_to_env(&self) {
        clear_flags();
        match self {
            Self::All => std::env::set_var(ENV_ENABLE_ALL, "1"),
            Self::None => std::env::set_var(ENV_ENABLE_ALL, "0"),
            Self::Groups(groups) => {
                for group in groups {
                    std::env::set_var(group.env_var(), "1");
                }
            }
        }
    }
}

/// Enable every group for connections opened from now on.
pub fn enable_all() {
    std::env::set_var(ENV_ENABLE_ALL, "1");
}

/// Disable every group for connections opened from now on.
pub fn disable_all() {
    std::env::set_var(ENV_ENABLE_ALL, "0");
}

/// Enable exactly the named groups; unknown names are ignored.
pub fn enable(names: &[&str]) {
    set_flags(names, "1");
}

/// Clear every flag, then mark the named groups disabled; unknown names are ignored.
pub fn disable(names: &[&str]) {
    set_flags(names, "0");
}

fn set_flags(names: &[&str], value: &str) {
    clear_flags();
    for group in names.iter().filter_map(|name| ExtensionGroup::from_name(name)) {
        std::env::set_var(group.env_var(), value);
    }
}

fn clear_flags() {
    std::env::remove_var(ENV_ENABLE_ALL);
    for group in ExtensionGroup::ALL {
        std::env::remove_var(group.env_var());
    }
}

/// Load the extension bundle into a freshly opened engine connection.
///
/// Nothing is loaded when the selection enables no group or no bundle path is
/// configured (neither `library` nor `SQLEAN_LIBRARY`).
pub(crate) fn load(
    engine: &libsql::Connection,
    selection: &ExtensionSelection,
    library: Option<&Path>,
) -> Result<()> {
    if !selection.enables_any() {
        return Ok(());
    }
    let Some(library) = library
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(ENV_LIBRARY).map(PathBuf::from))
    else {
        debug!(?selection, "no extension bundle configured, skipping load");
        return Ok(());
    };

    // The bundle's init routine reads the signal, so it must match the snapshot.
    selection.apply_to_env();

    engine
        .load_extension_enable()
        .map_err(|e| Error::Connection(format!("enabling extension loading failed: {e}")))?;
    let loaded = engine.load_extension(&library, Some(EXTENSION_ENTRY_POINT));
    let disabled = engine.load_extension_disable();

    loaded.map_err(|e| {
        Error::Connection(format!(
            "loading extension bundle {} failed: {e}",
            library.display()
        ))
    })?;
    disabled
        .map_err(|e| Error::Connection(format!("disabling extension loading failed: {e}")))?;

    debug!(library = %library.display(), ?selection, "loaded extension bundle");
    Ok(())
}
