//! Image catalog: logical image name → AMI id for one planning run.

use std::collections::BTreeMap;

use rollover_core::Manifest;

/// Strip the region qualifier packer puts in front of AMI ids.
///
/// Repeated qualifiers are all removed, so normalizing twice is the same
/// as normalizing once. An empty prefix leaves the id untouched.
pub fn normalize_image_id<'a>(artifact_id: &'a str, region_prefix: &str) -> &'a str {
    if region_prefix.is_empty() {
        return artifact_id;
    }
    artifact_id.trim_start_matches(region_prefix)
}

/// Snapshot of the images produced by the latest builds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageCatalog {
    images: BTreeMap<String, String>,
}

impl ImageCatalog {
    /// Build from a manifest. When a build name repeats, the later build wins.
    pub fn from_manifest(manifest: &Manifest, region_prefix: &str) -> Self {
        let images = manifest
            .builds
            .iter()
            .map(|b| {
                (
                    b.name.clone(),
                    normalize_image_id(&b.artifact_id, region_prefix).to_string(),
                )
            })
            .collect();
        Self { images }
    }

    pub fn get(&self, image_type: &str) -> Option<&str> {
        self.images.get(image_type).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.images.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for ImageCatalog
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            images: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
