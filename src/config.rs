//! Filesystem configuration.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use bitflags::bitflags;

use crate::attr::AttrValue;
use crate::error::Error;
use crate::error::Result;
use crate::name::Normalization;
use crate::name::check_normalizations;
use crate::path::PathService;
use crate::path::PathType;

/// Default bytes per block.
const DEFAULT_BLOCK_SIZE: u32 = 8192;
/// Default total byte cap: 4 GiB.
const DEFAULT_MAX_SIZE: u64 = 4 * 1024 * 1024 * 1024;

bitflags! {
    /// Optional filesystem capabilities.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Features: u8 {
        /// Hard links to regular files.
        const LINKS = 1 << 0;
        /// Symbolic links.
        const SYMBOLIC_LINKS = 1 << 1;
        /// Reported capability only; no operation depends on it.
        const SECURE_DIRECTORY_STREAM = 1 << 2;
        /// Random-access file channels.
        const FILE_CHANNEL = 1 << 3;
    }
}

/// A validated filesystem configuration. Build one with
/// [`ConfigBuilder`] or start from the [`unix`](Config::unix),
/// [`osx`](Config::osx) or [`windows`](Config::windows) presets.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) path_type: PathType,
    pub(crate) roots: Vec<String>,
    pub(crate) working_directory: String,
    pub(crate) name_display_normalization: Vec<Normalization>,
    pub(crate) name_canonical_normalization: Vec<Normalization>,
    pub(crate) path_equality_uses_canonical_form: bool,
    pub(crate) block_size: u32,
    pub(crate) max_size: u64,
    pub(crate) max_cache_size: Option<u64>,
    pub(crate) attribute_views: BTreeSet<String>,
    pub(crate) default_attribute_values: BTreeMap<String, AttrValue>,
    pub(crate) supported_features: Features,
}

impl Config {
    /// A unix-flavored filesystem: root `/`, working directory `/work`,
    /// case-sensitive names.
    pub fn unix() -> Config {
        Config {
            path_type: PathType::unix(),
            roots: vec!["/".to_owned()],
            working_directory: "/work".to_owned(),
            name_display_normalization: Vec::new(),
            name_canonical_normalization: Vec::new(),
            path_equality_uses_canonical_form: false,
            block_size: DEFAULT_BLOCK_SIZE,
            max_size: DEFAULT_MAX_SIZE,
            max_cache_size: None,
            attribute_views: BTreeSet::new(),
            default_attribute_values: BTreeMap::new(),
            supported_features: Features::LINKS
                | Features::SYMBOLIC_LINKS
                | Features::SECURE_DIRECTORY_STREAM
                | Features::FILE_CHANNEL,
        }
    }

    /// A macOS-flavored filesystem: unix paths with NFC display form and
    /// case-insensitive canonical form.
    pub fn osx() -> Config {
        Config {
            name_display_normalization: vec![Normalization::Nfc],
            name_canonical_normalization: vec![
                Normalization::Nfc,
                Normalization::CaseFoldAscii,
            ],
            path_equality_uses_canonical_form: true,
            supported_features: Features::LINKS
                | Features::SYMBOLIC_LINKS
                | Features::FILE_CHANNEL,
            ..Config::unix()
        }
    }

    /// A windows-flavored filesystem: root `C:\`, working directory
    /// `C:\work`, case-insensitive names.
    pub fn windows() -> Config {
        Config {
            path_type: PathType::windows(),
            roots: vec!["C:\\".to_owned()],
            working_directory: "C:\\work".to_owned(),
            name_display_normalization: Vec::new(),
            name_canonical_normalization: vec![Normalization::CaseFoldAscii],
            path_equality_uses_canonical_form: true,
            block_size: DEFAULT_BLOCK_SIZE,
            max_size: DEFAULT_MAX_SIZE,
            max_cache_size: None,
            attribute_views: BTreeSet::new(),
            default_attribute_values: BTreeMap::new(),
            supported_features: Features::LINKS
                | Features::SYMBOLIC_LINKS
                | Features::FILE_CHANNEL,
        }
    }

    /// A builder seeded from this configuration.
    pub fn to_builder(&self) -> ConfigBuilder {
        ConfigBuilder {
            config: self.clone(),
        }
    }

    /// Upper block count implied by `max_size` and `block_size`.
    pub(crate) fn max_block_count(&self) -> u32 {
        (self.max_size / u64::from(self.block_size)).min(u64::from(u32::MAX)) as u32
    }

    /// Upper cached-block count implied by `max_cache_size`; unlimited
    /// cache defaults to the disk cap itself.
    pub(crate) fn max_cached_block_count(&self) -> u32 {
        match self.max_cache_size {
            Some(bytes) => (bytes / u64::from(self.block_size)).min(u64::from(u32::MAX)) as u32,
            None => self.max_block_count(),
        }
    }

    /// The configured feature set.
    pub fn supported_features(&self) -> Features {
        self.supported_features
    }

    /// The configured path flavor.
    pub fn path_type(&self) -> PathType {
        self.path_type
    }
}

/// Builder for [`Config`]; validation happens in [`build`](ConfigBuilder::build).
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

const KNOWN_VIEWS: &[&str] = &["basic", "owner", "posix", "dos", "unix", "user"];

impl ConfigBuilder {
    /// Starts from the unix preset.
    pub fn unix() -> ConfigBuilder {
        Config::unix().to_builder()
    }

    /// Starts from the macOS preset.
    pub fn osx() -> ConfigBuilder {
        Config::osx().to_builder()
    }

    /// Starts from the windows preset.
    pub fn windows() -> ConfigBuilder {
        Config::windows().to_builder()
    }

    /// Replaces the root directories.
    pub fn roots<S: Into<String>>(mut self, roots: impl IntoIterator<Item = S>) -> Self {
        self.config.roots = roots.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the working directory; must be absolute under one of the roots.
    pub fn working_directory(mut self, path: impl Into<String>) -> Self {
        self.config.working_directory = path.into();
        self
    }

    /// Sets the display-form name normalizations.
    pub fn name_display_normalization(
        mut self,
        modes: impl IntoIterator<Item = Normalization>,
    ) -> Self {
        self.config.name_display_normalization = modes.into_iter().collect();
        self
    }

    /// Sets the canonical-form name normalizations.
    pub fn name_canonical_normalization(
        mut self,
        modes: impl IntoIterator<Item = Normalization>,
    ) -> Self {
        self.config.name_canonical_normalization = modes.into_iter().collect();
        self
    }

    /// Chooses which name form drives path equality and hashing.
    pub fn path_equality_uses_canonical_form(mut self, canonical: bool) -> Self {
        self.config.path_equality_uses_canonical_form = canonical;
        self
    }

    /// Sets bytes per block.
    pub fn block_size(mut self, block_size: u32) -> Self {
        self.config.block_size = block_size;
        self
    }

    /// Caps total regular-file storage in bytes.
    pub fn max_size(mut self, max_size: u64) -> Self {
        self.config.max_size = max_size;
        self
    }

    /// Caps the freed-block cache in bytes; `None` means the cache may grow
    /// to the disk cap.
    pub fn max_cache_size(mut self, max_cache_size: Option<u64>) -> Self {
        self.config.max_cache_size = max_cache_size;
        self
    }

    /// Enables attribute views beyond `basic`.
    pub fn attribute_views<S: Into<String>>(
        mut self,
        views: impl IntoIterator<Item = S>,
    ) -> Self {
        self.config.attribute_views = views.into_iter().map(Into::into).collect();
        self
    }

    /// Sets a default attribute value applied to every new file, keyed as
    /// `"view:attr"`.
    pub fn default_attribute_value(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.config
            .default_attribute_values
            .insert(key.into(), value);
        self
    }

    /// Replaces the feature set.
    pub fn supported_features(mut self, features: Features) -> Self {
        self.config.supported_features = features;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<Config> {
        let config = self.config;
        if config.block_size == 0 {
            return Err(Error::IllegalArgument("block size must be positive".to_owned()));
        }
        if config.max_size < u64::from(config.block_size) {
            return Err(Error::IllegalArgument(format!(
                "max size {} is smaller than one block ({})",
                config.max_size, config.block_size
            )));
        }
        check_normalizations(&config.name_display_normalization)
            .map_err(Error::IllegalArgument)?;
        check_normalizations(&config.name_canonical_normalization)
            .map_err(Error::IllegalArgument)?;

        if config.roots.is_empty() {
            return Err(Error::IllegalArgument(
                "at least one root is required".to_owned(),
            ));
        }
        let service = PathService::plain(config.path_type);
        for root in &config.roots {
            let parsed = service.parse_path(&[root.as_str()])?;
            if !parsed.is_absolute() || !parsed.names().is_empty() {
                return Err(Error::IllegalArgument(format!(
                    "not a root path: {root}"
                )));
            }
        }
        let wd = service.parse_path(&[config.working_directory.as_str()])?;
        if !wd.is_absolute() {
            return Err(Error::IllegalArgument(format!(
                "working directory must be absolute: {}",
                config.working_directory
            )));
        }

        for view in &config.attribute_views {
            if !KNOWN_VIEWS.contains(&view.as_str()) {
                return Err(Error::IllegalArgument(format!(
                    "unknown attribute view: {view}"
                )));
            }
        }
        Ok(config)
    }
}
