use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{
    error::CatalogError,
    profile::{ProfileDocument, VoiceProfile, PROFILE_FILE_NAME},
};

/// Immutable set of anchor profiles, indexed for the resolver.
///
/// Built once at start-up and shared read-only; there is no reload path.
#[derive(Debug, Default)]
pub struct ProfileCatalog {
    root: Option<PathBuf>,
    profiles: Vec<VoiceProfile>,
    positions: HashMap<String, usize>,
    by_archetype: HashMap<String, Vec<usize>>,
    by_archetype_gender: HashMap<(String, String), Vec<usize>>,
}

impl ProfileCatalog {
    /// Walks `root` and loads every directory that holds a `profile.json`.
    ///
    /// Never fails: a missing root yields an empty catalog and a bad profile
    /// is skipped with a warning.
    pub fn load(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        if !root.is_dir() {
            warn!(
                target = "anchortts::catalog",
                root = %root.display(),
                "profiles directory not found; continuing with an empty catalog"
            );
            let mut catalog = Self::default();
            catalog.root = Some(root.to_path_buf());
            return catalog;
        }

        let mut loaded = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(target = "anchortts::catalog", %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || entry.file_name() != PROFILE_FILE_NAME {
                continue;
            }
            let Some(dir) = entry.path().parent() else {
                continue;
            };
            match read_profile(dir) {
                Ok(profile) => {
                    debug!(
                        target = "anchortts::catalog",
                        profile = %profile.profile_id,
                        archetype = profile.base_archetype.as_deref().unwrap_or("-"),
                        "profile loaded"
                    );
                    loaded.push(profile);
                }
                Err(err) => {
                    warn!(
                        target = "anchortts::catalog",
                        dir = %dir.display(),
                        error = %err,
                        "skipping malformed profile"
                    );
                }
            }
        }

        let mut catalog = Self::from_profiles(loaded);
        catalog.root = Some(root.to_path_buf());
        info!(
            target = "anchortts::catalog",
            root = %root.display(),
            profiles = catalog.len(),
            archetypes = catalog.by_archetype.len(),
            "voice anchor catalog loaded"
        );
        catalog
    }

    /// Builds a catalog from profiles already in memory. On duplicate ids the
    /// first occurrence is kept.
    pub fn from_profiles(profiles: impl IntoIterator<Item = VoiceProfile>) -> Self {
        let mut unique: BTreeMap<String, VoiceProfile> = BTreeMap::new();
        for profile in profiles {
            if let Some(existing) = unique.get(&profile.profile_id) {
                warn!(
                    target = "anchortts::catalog",
                    profile = %profile.profile_id,
                    kept = %existing.directory.display(),
                    skipped = %profile.directory.display(),
                    "duplicate profile id"
                );
                continue;
            }
            unique.insert(profile.profile_id.clone(), profile);
        }

        let profiles: Vec<VoiceProfile> = unique.into_values().collect();
        let mut positions = HashMap::with_capacity(profiles.len());
        let mut by_archetype: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_archetype_gender: HashMap<(String, String), Vec<usize>> = HashMap::new();

        for (idx, profile) in profiles.iter().enumerate() {
            positions.insert(profile.profile_id.clone(), idx);
            let Some(archetype) = profile.base_archetype.as_ref() else {
                continue;
            };
            by_archetype.entry(archetype.clone()).or_default().push(idx);
            by_archetype_gender
                .entry((archetype.clone(), profile.resolved_gender().to_string()))
                .or_default()
                .push(idx);
        }

        Self {
            root: None,
            profiles,
            positions,
            by_archetype,
            by_archetype_gender,
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, profile_id: &str) -> Option<&VoiceProfile> {
        self.positions
            .get(profile_id)
            .map(|&idx| &self.profiles[idx])
    }

    /// Profiles ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &VoiceProfile> {
        self.profiles.iter()
    }

    pub fn archetypes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_archetype.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn exact_candidates(&self, archetype: &str, gender: &str) -> Vec<&VoiceProfile> {
        self.by_archetype_gender
            .get(&(archetype.to_string(), gender.to_string()))
            .map(|indices| self.collect(indices))
            .unwrap_or_default()
    }

    pub(crate) fn archetype_candidates(&self, archetype: &str) -> Vec<&VoiceProfile> {
        self.by_archetype
            .get(archetype)
            .map(|indices| self.collect(indices))
            .unwrap_or_default()
    }

    fn collect(&self, indices: &[usize]) -> Vec<&VoiceProfile> {
        indices.iter().map(|&idx| &self.profiles[idx]).collect()
    }
}

/// Reads `dir/profile.json`; the profile id is the directory name.
pub fn read_profile(dir: &Path) -> Result<VoiceProfile, CatalogError> {
    let profile_id = dir
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| CatalogError::UnnamedDirectory(dir.to_path_buf()))?;
    let path = dir.join(PROFILE_FILE_NAME);
    let bytes = fs::read(&path).map_err(|source| CatalogError::Io {
        path: path.clone(),
        source,
    })?;
    let document: ProfileDocument =
        serde_json::from_slice(&bytes).map_err(|source| CatalogError::Parse { path, source })?;
    Ok(VoiceProfile::from_document(
        profile_id,
        dir.to_path_buf(),
        document,
    ))
}
