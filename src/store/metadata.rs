use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use auto_impl::auto_impl;
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};

/// Resolves sample names, ids, and family relations
#[auto_impl(&, Box, Arc)]
pub trait MetadataResolver: Send + Sync {
    fn sample_id(&self, name: &str) -> Result<u32>;

    fn sample_name(&self, sample_id: u32) -> Result<String>;

    /// Father and mother ids of a sample, when registered
    fn parents(&self, sample_id: u32) -> Result<(Option<u32>, Option<u32>)>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMetadata {
    pub id: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub father: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mother: Option<u32>,
}

/// An in-memory [`MetadataResolver`], serialized as a JSON list of samples
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<SampleMetadata>", into = "Vec<SampleMetadata>")]
pub struct SampleRegistry {
    samples: BTreeMap<u32, SampleMetadata>,
    by_name: HashMap<String, u32>,
}
impl From<Vec<SampleMetadata>> for SampleRegistry {
    fn from(samples: Vec<SampleMetadata>) -> Self {
        let by_name = samples.iter().map(|s| (s.name.clone(), s.id)).collect();
        let samples = samples.into_iter().map(|s| (s.id, s)).collect();
        Self { samples, by_name }
    }
}
impl From<SampleRegistry> for Vec<SampleMetadata> {
    fn from(registry: SampleRegistry) -> Self {
        registry.samples.into_values().collect()
    }
}
impl SampleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `name`, assigning the next free id on first sight
    pub fn register(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self
            .samples
            .last_key_value()
            .map_or(0, |(&last, _)| last + 1);
        self.samples.insert(
            id,
            SampleMetadata {
                id,
                name: name.to_string(),
                father: None,
                mother: None,
            },
        );
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Registers a trio, creating any sample not yet known
    pub fn register_trio(&mut self, child: &str, father: Option<&str>, mother: Option<&str>) -> u32 {
        let father = father.map(|name| self.register(name));
        let mother = mother.map(|name| self.register(name));
        let child = self.register(child);
        if let Some(sample) = self.samples.get_mut(&child) {
            sample.father = father;
            sample.mother = mother;
        }
        child
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = &SampleMetadata> {
        self.samples.values()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.samples.values().collect::<Vec<_>>())?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}
impl MetadataResolver for SampleRegistry {
    fn sample_id(&self, name: &str) -> Result<u32> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| QueryError::UnknownSample(name.to_string()).into())
    }

    fn sample_name(&self, sample_id: u32) -> Result<String> {
        self.samples
            .get(&sample_id)
            .map(|s| s.name.clone())
            .ok_or_else(|| QueryError::UnknownSampleId(sample_id).into())
    }

    fn parents(&self, sample_id: u32) -> Result<(Option<u32>, Option<u32>)> {
        self.samples
            .get(&sample_id)
            .map(|s| (s.father, s.mother))
            .ok_or_else(|| QueryError::UnknownSampleId(sample_id).into())
    }
}
