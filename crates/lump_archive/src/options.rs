//! Settings that change how archives are read.

use bon::Builder;

/// Options for how an archive should be opened
///
/// ```
/// use lump_archive::OpenOptions;
///
/// let options = OpenOptions::builder().eager_load(true).build();
/// assert!(options.classify);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
pub struct OpenOptions {
    /// Copy every entry's payload into memory while parsing instead of on first access
    #[builder(default)]
    pub eager_load: bool,

    /// Run the archive's classifier on entries once their content is available
    #[builder(default = true)]
    pub classify: bool,

    /// Number of entries between two progress notifications
    #[builder(default = 256)]
    pub progress_interval: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}
